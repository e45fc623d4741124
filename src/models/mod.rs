mod app;
mod blocked_apps;
mod events;
mod permissions;

pub use app::{filter_installed_apps, InstalledApp};
pub use blocked_apps::{BlockedAppSet, DEFAULT_BLOCKED_APPS, INSTAGRAM, YOUTUBE};
pub use events::{BlockedAppEvent, DetectedAppEvent, PayloadError};
pub use permissions::{current_step, PermissionState, PermissionStep};
