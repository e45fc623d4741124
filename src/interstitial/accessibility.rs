use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use async_trait::async_trait;

/// Platform screen-reader hooks.
#[async_trait]
pub trait Accessibility: Send + Sync {
    async fn is_screen_reader_enabled(&self) -> bool;

    async fn announce(&self, message: &str);
}

/// No screen reader; nothing is ever announced.
pub struct NoScreenReader;

#[async_trait]
impl Accessibility for NoScreenReader {
    async fn is_screen_reader_enabled(&self) -> bool {
        false
    }

    async fn announce(&self, _message: &str) {}
}

/// Keeps announcements in memory. The screen reader can be switched on and
/// off at any point.
#[derive(Default)]
pub struct RecordingAccessibility {
    enabled: AtomicBool,
    announcements: Mutex<Vec<String>>,
}

impl RecordingAccessibility {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            announcements: Mutex::default(),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn announcements(&self) -> Vec<String> {
        match self.announcements.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Accessibility for RecordingAccessibility {
    async fn is_screen_reader_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn announce(&self, message: &str) {
        log::debug!("[interstitial] announce: {message}");
        match self.announcements.lock() {
            Ok(mut guard) => guard.push(message.to_string()),
            Err(poisoned) => poisoned.into_inner().push(message.to_string()),
        }
    }
}
