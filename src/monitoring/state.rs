use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::BlockerError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MonitoringState {
    #[default]
    Stopped,
    Starting,
    Active,
    Stopping,
}

impl MonitoringState {
    pub fn is_active(&self) -> bool {
        matches!(self, MonitoringState::Active)
    }

    /// Label shown next to the monitoring switch.
    pub fn label(&self) -> &'static str {
        match self {
            MonitoringState::Stopped => "Inactive",
            MonitoringState::Starting => "Starting",
            MonitoringState::Active => "Active",
            MonitoringState::Stopping => "Stopping",
        }
    }
}

/// Operation bookkeeping for the coordinator.
///
/// `request` is bumped as soon as a user start/stop arrives, before it waits
/// for the lifecycle lock. `issue` hands out a token once the lock is held; a
/// completion may only write state while its token is still the newest.
#[derive(Debug, Default)]
pub struct OperationClock {
    latest: AtomicU64,
    requested: AtomicU64,
}

impl OperationClock {
    pub fn request(&self) -> u64 {
        self.requested.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn requested(&self) -> u64 {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn observe(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    pub fn check(&self, token: u64) -> Result<(), BlockerError> {
        let latest = self.observe();
        if token == latest {
            Ok(())
        } else {
            Err(BlockerError::StaleCompletion { token, latest })
        }
    }

    /// Fails if a user operation arrived since `seen` was read from
    /// [`requested`](Self::requested), even one still waiting for the lock.
    pub fn check_requests(&self, seen: u64) -> Result<(), BlockerError> {
        let latest = self.requested();
        if seen == latest {
            Ok(())
        } else {
            Err(BlockerError::StaleCompletion { token: seen, latest })
        }
    }
}
