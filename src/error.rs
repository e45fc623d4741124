//! Error types shared across the coordination core.
//!
//! Calls triggered by the user return these to the caller so a message can be
//! shown. Work triggered by host lifecycle changes (auto-restart, bootstrap,
//! resume checks) logs them and carries on.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by the enforcement engine. The engine only hands back a
/// message, so that is all we keep.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Engine call that failed, used to name the operation in user-facing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineOperation {
    CheckPermissions,
    RequestPermissions,
    RequestOverlayPermission,
    SetBlockedApps,
    StartMonitoring,
    StopMonitoring,
    IsUsageAccessGranted,
    GetInstalledApps,
}

impl EngineOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineOperation::CheckPermissions => "checkPermissions",
            EngineOperation::RequestPermissions => "requestPermissions",
            EngineOperation::RequestOverlayPermission => "requestOverlayPermission",
            EngineOperation::SetBlockedApps => "setBlockedApps",
            EngineOperation::StartMonitoring => "startMonitoring",
            EngineOperation::StopMonitoring => "stopMonitoring",
            EngineOperation::IsUsageAccessGranted => "isUsageAccessGranted",
            EngineOperation::GetInstalledApps => "getInstalledApps",
        }
    }
}

impl fmt::Display for EngineOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum BlockerError {
    /// Permission query failed; the gate stays on its current step.
    #[error("permission check failed: {0}")]
    PermissionCheckFailed(#[source] EngineError),

    #[error("{operation} failed: {source}")]
    EngineCallFailed {
        operation: EngineOperation,
        #[source]
        source: EngineError,
    },

    /// Post-grant auto-start failed. Never fatal.
    #[error("monitoring bootstrap failed: {0}")]
    BootstrapFailed(#[source] Box<BlockerError>),

    /// An operation resolved after a newer one had already been issued.
    #[error("stale completion for operation {token} (latest is {latest})")]
    StaleCompletion { token: u64, latest: u64 },

    #[error(transparent)]
    Settings(#[from] anyhow::Error),
}

impl BlockerError {
    pub fn engine(operation: EngineOperation, source: EngineError) -> Self {
        BlockerError::EngineCallFailed { operation, source }
    }

    /// Operation named by an engine failure, if this is one.
    pub fn operation(&self) -> Option<EngineOperation> {
        match self {
            BlockerError::EngineCallFailed { operation, .. } => Some(*operation),
            BlockerError::BootstrapFailed(inner) => inner.operation(),
            _ => None,
        }
    }
}

pub type Result<T, E = BlockerError> = std::result::Result<T, E>;
