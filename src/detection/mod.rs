pub mod bus;
pub mod recent;

pub use bus::{DetectionBus, APP_DETECTED, BLOCKED_APP_OPENED};
pub use recent::{RecentApps, RECENT_APPS_CAPACITY};
