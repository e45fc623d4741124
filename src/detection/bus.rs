use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};

use serde_json::Value;
use tokio::sync::broadcast;

use crate::models::{BlockedAppEvent, DetectedAppEvent};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Event name the engine bridge uses for every foreground-app change.
pub const APP_DETECTED: &str = "onAppDetected";
/// Event name the engine bridge uses when it intercepts a blocked app.
pub const BLOCKED_APP_OPENED: &str = "onBlockedAppOpened";

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

struct BusInner {
    app_detected: Mutex<Option<broadcast::Sender<DetectedAppEvent>>>,
    blocked_app_opened: Mutex<Option<broadcast::Sender<BlockedAppEvent>>>,
    dropped: AtomicU64,
}

/// Process-wide delivery of engine push events. Built once at startup,
/// cloned into whoever needs it, and shut down on teardown.
#[derive(Clone)]
pub struct DetectionBus {
    inner: Arc<BusInner>,
}

impl Default for DetectionBus {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (app_detected, _) = broadcast::channel(capacity.max(1));
        let (blocked_app_opened, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                app_detected: Mutex::new(Some(app_detected)),
                blocked_app_opened: Mutex::new(Some(blocked_app_opened)),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// `None` once the bus has been shut down.
    pub fn subscribe_app_detected(&self) -> Option<broadcast::Receiver<DetectedAppEvent>> {
        lock(&self.inner.app_detected).as_ref().map(|tx| tx.subscribe())
    }

    pub fn subscribe_blocked_app_opened(&self) -> Option<broadcast::Receiver<BlockedAppEvent>> {
        lock(&self.inner.blocked_app_opened)
            .as_ref()
            .map(|tx| tx.subscribe())
    }

    /// Entry point for the engine bridge. The payload is validated here;
    /// anything unknown or malformed is dropped with a warning.
    ///
    /// Returns whether the event was accepted.
    pub fn publish_raw(&self, event_name: &str, payload: &Value) -> bool {
        match event_name {
            APP_DETECTED => match DetectedAppEvent::from_payload(payload) {
                Ok(event) => self.publish_app_detected(event),
                Err(err) => self.reject(event_name, &err.to_string()),
            },
            BLOCKED_APP_OPENED => match BlockedAppEvent::from_payload(payload) {
                Ok(event) => self.publish_blocked_app_opened(event),
                Err(err) => self.reject(event_name, &err.to_string()),
            },
            other => self.reject(other, "unknown event name"),
        }
    }

    pub fn publish_app_detected(&self, event: DetectedAppEvent) -> bool {
        let guard = lock(&self.inner.app_detected);
        let Some(tx) = guard.as_ref() else {
            log_debug!("[detection] bus shut down, dropping {APP_DETECTED}");
            return false;
        };
        if tx.send(event).is_err() {
            log_debug!("[detection] no listeners for {APP_DETECTED}");
        }
        true
    }

    pub fn publish_blocked_app_opened(&self, event: BlockedAppEvent) -> bool {
        let guard = lock(&self.inner.blocked_app_opened);
        let Some(tx) = guard.as_ref() else {
            log_debug!("[detection] bus shut down, dropping {BLOCKED_APP_OPENED}");
            return false;
        };
        if tx.send(event).is_err() {
            log_debug!("[detection] no listeners for {BLOCKED_APP_OPENED}");
        }
        true
    }

    /// Payloads rejected at the boundary since startup.
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Closes both channels; receivers drain what is buffered and then see
    /// `RecvError::Closed`.
    pub fn shutdown(&self) {
        lock(&self.inner.app_detected).take();
        lock(&self.inner.blocked_app_opened).take();
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.inner.app_detected).is_none()
    }

    fn reject(&self, event_name: &str, reason: &str) -> bool {
        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        log_warn!("[detection] dropping {event_name} payload: {reason}");
        false
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
