//! Boundary to the native enforcement engine.
//!
//! The engine lives in a separate OS-managed service; everything here is an
//! async request/response call that may fail with a message. Push events do
//! not come through this trait, the bridge hands them to
//! [`DetectionBus::publish_raw`](crate::detection::DetectionBus::publish_raw).

mod simulated;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::models::{InstalledApp, PermissionState};

pub use simulated::{EngineCall, SimulatedEngine};

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[async_trait]
pub trait EnforcementEngine: Send + Sync {
    async fn check_permissions(&self) -> EngineResult<PermissionState>;

    /// Opens the usage-access settings page. Completion is only observable by
    /// checking permissions again after the host app resumes.
    async fn request_permissions(&self) -> EngineResult<()>;

    /// Opens the draw-over-apps settings page.
    async fn request_overlay_permission(&self) -> EngineResult<()>;

    /// Replaces the block list; allowed while monitoring is running.
    async fn set_blocked_apps(&self, app_identifiers: &[String]) -> EngineResult<()>;

    async fn start_monitoring(&self) -> EngineResult<()>;

    async fn stop_monitoring(&self) -> EngineResult<()>;

    async fn is_usage_access_granted(&self) -> EngineResult<bool>;

    async fn get_installed_apps(&self) -> EngineResult<Vec<InstalledApp>>;
}
