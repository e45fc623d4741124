use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::detection::{DetectionBus, APP_DETECTED, BLOCKED_APP_OPENED};
use crate::error::{EngineError, EngineOperation};
use crate::models::{InstalledApp, PermissionState};

use super::{EnforcementEngine, EngineResult};

/// One call received by the [`SimulatedEngine`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    CheckPermissions,
    RequestPermissions,
    RequestOverlayPermission,
    SetBlockedApps(Vec<String>),
    StartMonitoring,
    StopMonitoring,
    IsUsageAccessGranted,
    GetInstalledApps,
}

impl EngineCall {
    pub fn operation(&self) -> EngineOperation {
        match self {
            EngineCall::CheckPermissions => EngineOperation::CheckPermissions,
            EngineCall::RequestPermissions => EngineOperation::RequestPermissions,
            EngineCall::RequestOverlayPermission => EngineOperation::RequestOverlayPermission,
            EngineCall::SetBlockedApps(_) => EngineOperation::SetBlockedApps,
            EngineCall::StartMonitoring => EngineOperation::StartMonitoring,
            EngineCall::StopMonitoring => EngineOperation::StopMonitoring,
            EngineCall::IsUsageAccessGranted => EngineOperation::IsUsageAccessGranted,
            EngineCall::GetInstalledApps => EngineOperation::GetInstalledApps,
        }
    }
}

#[derive(Default)]
struct SimulatedState {
    permissions: PermissionState,
    grant_on_request: bool,
    monitoring: bool,
    blocked_apps: Vec<String>,
    installed_apps: Vec<InstalledApp>,
    calls: Vec<EngineCall>,
    failures: HashMap<EngineOperation, String>,
    latency: HashMap<EngineOperation, Duration>,
}

/// In-process stand-in for the native engine. Records every call, can be
/// told to fail or stall specific operations, and pushes detection events
/// the way the native bridge does when a bus is attached.
#[derive(Clone, Default)]
pub struct SimulatedEngine {
    state: Arc<Mutex<SimulatedState>>,
    bus: Option<DetectionBus>,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bus(bus: DetectionBus) -> Self {
        Self {
            state: Arc::default(),
            bus: Some(bus),
        }
    }

    pub fn with_installed_apps(self, apps: Vec<InstalledApp>) -> Self {
        self.lock().installed_apps = apps;
        self
    }

    pub fn set_permissions(&self, permissions: PermissionState) {
        self.lock().permissions = permissions;
    }

    pub fn grant_usage(&self) {
        self.lock().permissions.usage = true;
    }

    pub fn grant_overlay(&self) {
        self.lock().permissions.overlay = true;
    }

    /// Treat a settings-page request as the user immediately granting it.
    pub fn set_grant_on_request(&self, enabled: bool) {
        self.lock().grant_on_request = enabled;
    }

    /// Every call to `operation` fails with `message` until cleared.
    pub fn fail(&self, operation: EngineOperation, message: impl Into<String>) {
        self.lock().failures.insert(operation, message.into());
    }

    pub fn clear_failure(&self, operation: EngineOperation) {
        self.lock().failures.remove(&operation);
    }

    /// Every call to `operation` takes `delay` (tokio time) before resolving.
    pub fn set_latency(&self, operation: EngineOperation, delay: Duration) {
        self.lock().latency.insert(operation, delay);
    }

    /// Foreground switch to `app_identifier`. Emits `onAppDetected`, plus
    /// `onBlockedAppOpened` when monitoring is on and the app is blocked.
    /// Returns whether a block was enforced.
    pub fn simulate_foreground(&self, app_identifier: &str, app_name: Option<&str>) -> bool {
        let blocked = {
            let state = self.lock();
            state.monitoring && state.blocked_apps.iter().any(|app| app == app_identifier)
        };

        let Some(bus) = &self.bus else {
            return blocked;
        };

        let payload = json!({
            "packageName": app_identifier,
            "appName": app_name,
            "timestamp": Utc::now().timestamp_millis() as f64,
        });
        bus.publish_raw(APP_DETECTED, &payload);
        if blocked {
            bus.publish_raw(BLOCKED_APP_OPENED, &payload);
        }
        blocked
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, operation: EngineOperation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn is_monitoring(&self) -> bool {
        self.lock().monitoring
    }

    pub fn blocked_apps(&self) -> Vec<String> {
        self.lock().blocked_apps.clone()
    }

    pub fn permissions(&self) -> PermissionState {
        self.lock().permissions
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Records the call, waits out any configured latency, then reports the
    /// configured failure if there is one.
    async fn enter(&self, call: EngineCall) -> EngineResult<()> {
        let operation = call.operation();
        let delay = {
            let mut state = self.lock();
            state.calls.push(call);
            state.latency.get(&operation).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.lock().failures.get(&operation) {
            Some(message) => Err(EngineError::new(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EnforcementEngine for SimulatedEngine {
    async fn check_permissions(&self) -> EngineResult<PermissionState> {
        self.enter(EngineCall::CheckPermissions).await?;
        Ok(self.lock().permissions)
    }

    async fn request_permissions(&self) -> EngineResult<()> {
        self.enter(EngineCall::RequestPermissions).await?;
        let mut state = self.lock();
        if state.grant_on_request {
            state.permissions.usage = true;
        }
        Ok(())
    }

    async fn request_overlay_permission(&self) -> EngineResult<()> {
        self.enter(EngineCall::RequestOverlayPermission).await?;
        let mut state = self.lock();
        if state.grant_on_request {
            state.permissions.overlay = true;
        }
        Ok(())
    }

    async fn set_blocked_apps(&self, app_identifiers: &[String]) -> EngineResult<()> {
        self.enter(EngineCall::SetBlockedApps(app_identifiers.to_vec()))
            .await?;
        self.lock().blocked_apps = app_identifiers.to_vec();
        Ok(())
    }

    async fn start_monitoring(&self) -> EngineResult<()> {
        self.enter(EngineCall::StartMonitoring).await?;
        let mut state = self.lock();
        if !state.permissions.usage {
            return Err(EngineError::new("usage access not granted"));
        }
        state.monitoring = true;
        Ok(())
    }

    async fn stop_monitoring(&self) -> EngineResult<()> {
        self.enter(EngineCall::StopMonitoring).await?;
        self.lock().monitoring = false;
        Ok(())
    }

    async fn is_usage_access_granted(&self) -> EngineResult<bool> {
        self.enter(EngineCall::IsUsageAccessGranted).await?;
        Ok(self.lock().permissions.usage)
    }

    async fn get_installed_apps(&self) -> EngineResult<Vec<InstalledApp>> {
        self.enter(EngineCall::GetInstalledApps).await?;
        Ok(self.lock().installed_apps.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_and_applies_block_list() {
        let engine = SimulatedEngine::new();
        engine.grant_usage();

        engine
            .set_blocked_apps(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        engine.start_monitoring().await.unwrap();

        assert!(engine.is_monitoring());
        assert_eq!(engine.blocked_apps(), vec!["a", "b"]);
        assert_eq!(
            engine.calls(),
            vec![
                EngineCall::SetBlockedApps(vec!["a".into(), "b".into()]),
                EngineCall::StartMonitoring,
            ]
        );
    }

    #[tokio::test]
    async fn configured_failures_are_reported() {
        let engine = SimulatedEngine::new();
        engine.fail(EngineOperation::StopMonitoring, "service gone");

        let err = engine.stop_monitoring().await.unwrap_err();
        assert_eq!(err.message, "service gone");

        engine.clear_failure(EngineOperation::StopMonitoring);
        assert!(engine.stop_monitoring().await.is_ok());
        assert_eq!(engine.count(EngineOperation::StopMonitoring), 2);
    }

    #[tokio::test]
    async fn refuses_to_start_without_usage_access() {
        let engine = SimulatedEngine::new();
        assert!(engine.start_monitoring().await.is_err());
        assert!(!engine.is_monitoring());
    }

    #[tokio::test]
    async fn foreground_switch_to_blocked_app_publishes_both_events() {
        let bus = DetectionBus::new();
        let mut detected = bus.subscribe_app_detected().unwrap();
        let mut blocked = bus.subscribe_blocked_app_opened().unwrap();
        let engine = SimulatedEngine::with_bus(bus);
        engine.grant_usage();
        engine.set_blocked_apps(&["x".to_string()]).await.unwrap();
        engine.start_monitoring().await.unwrap();

        assert!(engine.simulate_foreground("x", Some("X")));
        assert_eq!(detected.recv().await.unwrap().app_identifier, "x");
        assert_eq!(blocked.recv().await.unwrap().app_identifier, "x");

        assert!(!engine.simulate_foreground("y", None));
        assert_eq!(detected.recv().await.unwrap().app_identifier, "y");
        assert!(blocked.try_recv().is_err());
    }
}
