use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

use serde::Serialize;
use tokio::sync::watch;

use crate::{
    engine::EnforcementEngine,
    error::{BlockerError, EngineOperation, Result},
    lifecycle::{AppLifecycle, LifecycleTracker, LifecycleTransition},
    models::{current_step, PermissionState, PermissionStep},
    monitoring::MonitoringCoordinator,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "step")]
pub enum GateStatus {
    Pending(PermissionStep),
    Complete,
}

/// Walks the user through the required permissions, one at a time, and
/// starts monitoring once everything is granted.
///
/// The OS settings pages give no callback, so the only way forward is to
/// check again when the host app comes back to the foreground.
#[derive(Clone)]
pub struct PermissionGate {
    engine: Arc<dyn EnforcementEngine>,
    coordinator: MonitoringCoordinator,
    step: Arc<Mutex<Option<PermissionStep>>>,
    bootstrapped: Arc<AtomicBool>,
    completion: Arc<watch::Sender<bool>>,
    lifecycle: Arc<Mutex<LifecycleTracker>>,
}

impl PermissionGate {
    pub fn new(engine: Arc<dyn EnforcementEngine>, coordinator: MonitoringCoordinator) -> Self {
        let (completion, _) = watch::channel(false);
        Self {
            engine,
            coordinator,
            step: Arc::new(Mutex::new(Some(PermissionStep::ORDER[0]))),
            bootstrapped: Arc::new(AtomicBool::new(false)),
            completion: Arc::new(completion),
            lifecycle: Arc::new(Mutex::new(LifecycleTracker::default())),
        }
    }

    pub fn status(&self) -> GateStatus {
        match *self.step_slot() {
            Some(step) => GateStatus::Pending(step),
            None => GateStatus::Complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        *self.completion.borrow()
    }

    /// Flips to `true` once, after the bootstrap attempt finished.
    pub fn completion(&self) -> watch::Receiver<bool> {
        self.completion.subscribe()
    }

    pub async fn check_all(&self) -> Result<PermissionState> {
        self.engine
            .check_permissions()
            .await
            .map_err(BlockerError::PermissionCheckFailed)
    }

    /// Re-check permissions and move to the first missing step. When none is
    /// missing, bootstrap monitoring (once) and report completion.
    ///
    /// A failed check is logged and leaves the step where it was.
    pub async fn advance(&self) -> GateStatus {
        let permissions = match self.check_all().await {
            Ok(permissions) => permissions,
            Err(err) => {
                log_warn!("[permissions] {err}");
                return self.status();
            }
        };

        let next = current_step(&permissions);
        *self.step_slot() = next;

        match next {
            Some(step) => {
                log_debug!("[permissions] waiting on {} permission", step.as_str());
                GateStatus::Pending(step)
            }
            None => {
                self.bootstrap().await;
                GateStatus::Complete
            }
        }
    }

    /// Open the settings page for the current step. Whether the user granted
    /// anything is only known after the next resume.
    pub async fn request_current(&self) {
        let current = *self.step_slot();
        let Some(step) = current else {
            return;
        };

        let (operation, result) = match step {
            PermissionStep::Usage => (
                EngineOperation::RequestPermissions,
                self.engine.request_permissions().await,
            ),
            PermissionStep::Overlay => (
                EngineOperation::RequestOverlayPermission,
                self.engine.request_overlay_permission().await,
            ),
        };

        if let Err(err) = result {
            log_warn!("[permissions] {}", BlockerError::engine(operation, err));
        }
    }

    /// Re-checks on resume. Ignored once the gate has completed.
    pub async fn handle_app_state(&self, next: AppLifecycle) -> Option<GateStatus> {
        let transition = match self.lifecycle.lock() {
            Ok(mut tracker) => tracker.observe(next),
            Err(poisoned) => poisoned.into_inner().observe(next),
        };

        if transition != LifecycleTransition::Resumed || self.is_complete() {
            return None;
        }
        Some(self.advance().await)
    }

    async fn bootstrap(&self) {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            // Someone else is bootstrapping; report complete only once they are done.
            let mut completion = self.completion.subscribe();
            let _ = completion.wait_for(|done| *done).await;
            return;
        }

        log_info!("[permissions] all permissions granted, starting monitoring");
        self.coordinator.initialize().await;
        if let Err(err) = self.coordinator.start().await {
            let err = BlockerError::BootstrapFailed(Box::new(err));
            log_warn!("[permissions] {err}");
        }

        self.completion.send_replace(true);
    }

    fn step_slot(&self) -> MutexGuard<'_, Option<PermissionStep>> {
        match self.step.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::BlockerConfig;
    use crate::engine::{EngineCall, SimulatedEngine};
    use crate::monitoring::MonitoringState;
    use crate::settings::MemorySettingsStore;

    fn setup() -> (PermissionGate, SimulatedEngine, MonitoringCoordinator) {
        let engine = SimulatedEngine::new();
        let coordinator = MonitoringCoordinator::new(
            Arc::new(engine.clone()),
            Arc::new(MemorySettingsStore::new()),
            &BlockerConfig::default(),
        );
        let gate = PermissionGate::new(Arc::new(engine.clone()), coordinator.clone());
        (gate, engine, coordinator)
    }

    #[tokio::test]
    async fn failed_check_keeps_the_current_step() {
        let (gate, engine, _coordinator) = setup();
        engine.grant_usage();
        assert_eq!(gate.advance().await, GateStatus::Pending(PermissionStep::Overlay));

        engine.grant_overlay();
        engine.fail(EngineOperation::CheckPermissions, "binder died");
        assert_eq!(gate.advance().await, GateStatus::Pending(PermissionStep::Overlay));
        assert!(!gate.is_complete());
    }

    #[tokio::test]
    async fn request_targets_the_current_step() {
        let (gate, engine, _coordinator) = setup();
        gate.advance().await;
        gate.request_current().await;

        engine.grant_usage();
        gate.advance().await;
        gate.request_current().await;

        assert_eq!(engine.count(EngineOperation::RequestPermissions), 1);
        assert_eq!(engine.count(EngineOperation::RequestOverlayPermission), 1);
    }

    #[tokio::test]
    async fn request_failure_is_swallowed() {
        let (gate, engine, _coordinator) = setup();
        engine.fail(EngineOperation::RequestPermissions, "no settings activity");
        gate.request_current().await;
        assert_eq!(gate.status(), GateStatus::Pending(PermissionStep::Usage));
    }

    #[tokio::test]
    async fn only_a_resume_triggers_a_check() {
        let (gate, engine, _coordinator) = setup();

        assert_eq!(gate.handle_app_state(AppLifecycle::Active).await, None);
        assert_eq!(gate.handle_app_state(AppLifecycle::Background).await, None);
        assert!(engine.calls().is_empty());

        assert_eq!(
            gate.handle_app_state(AppLifecycle::Active).await,
            Some(GateStatus::Pending(PermissionStep::Usage))
        );
        assert_eq!(engine.calls(), vec![EngineCall::CheckPermissions]);
    }

    #[tokio::test]
    async fn bootstrap_failure_still_completes() {
        let (gate, engine, coordinator) = setup();
        engine.grant_usage();
        engine.grant_overlay();
        engine.fail(EngineOperation::StartMonitoring, "service refused");

        assert_eq!(gate.advance().await, GateStatus::Complete);
        assert!(gate.is_complete());
        assert_eq!(coordinator.state(), MonitoringState::Stopped);
    }

    #[tokio::test]
    async fn bootstrap_runs_once() {
        let (gate, engine, _coordinator) = setup();
        engine.grant_usage();
        engine.grant_overlay();
        let mut completion = gate.completion();

        gate.advance().await;
        gate.advance().await;

        assert!(*completion.borrow_and_update());
        assert_eq!(engine.count(EngineOperation::StartMonitoring), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_advance_waits_for_bootstrap() {
        let (gate, engine, coordinator) = setup();
        engine.grant_usage();
        engine.grant_overlay();
        engine.set_latency(EngineOperation::StartMonitoring, Duration::from_millis(500));

        let first = gate.clone();
        let bootstrapping = tokio::spawn(async move { first.advance().await });
        tokio::task::yield_now().await;

        assert_eq!(gate.advance().await, GateStatus::Complete);
        assert!(gate.is_complete());
        assert_eq!(coordinator.state(), MonitoringState::Active);

        assert_eq!(bootstrapping.await.unwrap(), GateStatus::Complete);
        assert_eq!(engine.count(EngineOperation::StartMonitoring), 1);
    }
}
