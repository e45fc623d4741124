use std::collections::VecDeque;

use crate::models::DetectedAppEvent;

pub const RECENT_APPS_CAPACITY: usize = 10;

/// Most recent detections, for display only. Arrival order is kept as
/// delivered and duplicates are not collapsed.
#[derive(Debug, Clone)]
pub struct RecentApps {
    entries: VecDeque<DetectedAppEvent>,
    capacity: usize,
}

impl Default for RecentApps {
    fn default() -> Self {
        Self::new(RECENT_APPS_CAPACITY)
    }
}

impl RecentApps {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends, evicting the oldest entry once full.
    pub fn push(&mut self, event: DetectedAppEvent) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Newest first, the order the dashboard lists them in.
    pub fn newest_first(&self) -> Vec<DetectedAppEvent> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
