//! Coordination core of the DoomScrollStopper app blocker.
//!
//! The native enforcement engine watches the foreground app and draws the
//! block overlay; this crate decides when it runs and with which apps:
//!
//! - [`permissions::PermissionGate`] walks the user through the required
//!   permissions and bootstraps monitoring once they are all granted.
//! - [`monitoring::MonitoringCoordinator`] owns the engine lifecycle and the
//!   persisted block list.
//! - [`detection::DetectionBus`] carries the engine's push events.
//! - [`interstitial`] runs the countdown shown over a blocked app.
//! - [`runtime::BlockerRuntime`] wires all of the above to one engine, one
//!   settings store and one bus.

pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod interstitial;
pub mod lifecycle;
pub mod models;
pub mod monitoring;
pub mod permissions;
pub mod runtime;
pub mod settings;
pub mod utils;

pub use config::{BlockerConfig, InterstitialSettings};
pub use detection::DetectionBus;
pub use engine::{EnforcementEngine, SimulatedEngine};
pub use error::{BlockerError, EngineError, EngineOperation, Result};
pub use lifecycle::AppLifecycle;
pub use monitoring::{MonitoringCoordinator, MonitoringState};
pub use permissions::{GateStatus, PermissionGate};
pub use runtime::BlockerRuntime;
pub use settings::{JsonSettingsStore, MemorySettingsStore, SettingsStore};
