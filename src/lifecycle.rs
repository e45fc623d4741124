use serde::{Deserialize, Serialize};

/// Host app state as reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppLifecycle {
    #[default]
    Active,
    Inactive,
    Background,
}

impl AppLifecycle {
    pub fn is_foreground(&self) -> bool {
        matches!(self, AppLifecycle::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleTransition {
    /// inactive/background -> active
    Resumed,
    /// active -> inactive/background
    Backgrounded,
    Unchanged,
}

/// Remembers the previous host state so each consumer can tell a resume
/// from a repeated `active` notification.
#[derive(Debug, Clone, Default)]
pub struct LifecycleTracker {
    current: AppLifecycle,
}

impl LifecycleTracker {
    pub fn new(initial: AppLifecycle) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> AppLifecycle {
        self.current
    }

    pub fn observe(&mut self, next: AppLifecycle) -> LifecycleTransition {
        let previous = std::mem::replace(&mut self.current, next);
        match (previous.is_foreground(), next.is_foreground()) {
            (false, true) => LifecycleTransition::Resumed,
            (true, false) => LifecycleTransition::Backgrounded,
            _ => LifecycleTransition::Unchanged,
        }
    }
}
