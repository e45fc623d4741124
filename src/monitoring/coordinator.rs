use std::{sync::Arc, time::Duration};

use tokio::sync::{watch, Mutex};

use crate::{
    config::BlockerConfig,
    engine::EnforcementEngine,
    error::{BlockerError, EngineOperation, Result},
    lifecycle::{AppLifecycle, LifecycleTracker, LifecycleTransition},
    models::BlockedAppSet,
    settings::SettingsStore,
};

use super::{debounce::Debouncer, MonitoringState, OperationClock};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Single authority over whether background enforcement is running.
///
/// Lifecycle calls (start, stop, the restart sequence, block-list syncs) run
/// one at a time behind `op_lock`, in the order they asked for it. Tokens are
/// issued only once the lock is held. A user start/stop also registers a
/// request on arrival so a restart sitting in its settle delay can stand down
/// for it.
#[derive(Clone)]
pub struct MonitoringCoordinator {
    engine: Arc<dyn EnforcementEngine>,
    settings: Arc<dyn SettingsStore>,
    state: Arc<watch::Sender<MonitoringState>>,
    blocked: Arc<Mutex<BlockedAppSet>>,
    op_lock: Arc<Mutex<()>>,
    clock: Arc<OperationClock>,
    restart: Arc<Debouncer>,
    settle: Duration,
    default_blocked: BlockedAppSet,
    lifecycle: Arc<std::sync::Mutex<LifecycleTracker>>,
}

impl MonitoringCoordinator {
    pub fn new(
        engine: Arc<dyn EnforcementEngine>,
        settings: Arc<dyn SettingsStore>,
        config: &BlockerConfig,
    ) -> Self {
        let (state, _) = watch::channel(MonitoringState::Stopped);
        Self {
            engine,
            settings,
            state: Arc::new(state),
            blocked: Arc::new(Mutex::new(BlockedAppSet::new())),
            op_lock: Arc::new(Mutex::new(())),
            clock: Arc::new(OperationClock::default()),
            restart: Arc::new(Debouncer::new(config.restart_debounce())),
            settle: config.restart_settle(),
            default_blocked: config.default_blocked_set(),
            lifecycle: Arc::new(std::sync::Mutex::new(LifecycleTracker::default())),
        }
    }

    pub fn state(&self) -> MonitoringState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitoringState> {
        self.state.subscribe()
    }

    pub async fn blocked_apps(&self) -> BlockedAppSet {
        self.blocked.lock().await.clone()
    }

    /// Loads the persisted block list. An absent or empty list is replaced by
    /// the defaults, which are written back.
    pub async fn initialize(&self) -> BlockedAppSet {
        let saved = match self.settings.get_blocked_apps().await {
            Ok(saved) => saved.unwrap_or_default(),
            Err(err) => {
                log_warn!("[monitoring] failed to load blocked apps, using defaults: {err:#}");
                Vec::new()
            }
        };

        let mut blocked = self.blocked.lock().await;
        *blocked = BlockedAppSet::from(saved);
        if blocked.is_empty() {
            *blocked = self.default_blocked.clone();
            if let Err(err) = self.settings.save_blocked_apps(&blocked.to_vec()).await {
                log_warn!("[monitoring] failed to persist default blocked apps: {err:#}");
            }
        }

        log_info!("[monitoring] loaded {} blocked apps", blocked.len());
        blocked.clone()
    }

    /// Push the current block list and start the engine.
    ///
    /// An empty list is a no-op. Calling this while already active only
    /// re-syncs the list.
    pub async fn start(&self) -> Result<MonitoringState> {
        self.clock.request();
        let _guard = self.op_lock.lock().await;
        let token = self.clock.issue();
        self.start_locked(token).await
    }

    /// Stop the engine. Local state ends up `Stopped` even if the engine call
    /// fails; the failure is still returned.
    pub async fn stop(&self) -> Result<()> {
        self.clock.request();
        self.restart.cancel();
        let _guard = self.op_lock.lock().await;
        let token = self.clock.issue();

        self.write_state(token, MonitoringState::Stopping);
        let result = self.engine.stop_monitoring().await;
        self.write_state(token, MonitoringState::Stopped);

        if let Err(err) = self.settings.save_monitoring_enabled(false).await {
            log_warn!("[monitoring] failed to persist monitoring flag: {err:#}");
        }

        match result {
            Ok(()) => {
                log_info!("[monitoring] stopped");
                Ok(())
            }
            Err(err) => {
                log_error!("[monitoring] stopMonitoring failed: {err}");
                Err(BlockerError::engine(EngineOperation::StopMonitoring, err))
            }
        }
    }

    /// Flip whether `app_identifier` is blocked; returns the new membership.
    ///
    /// The set is persisted before anything is sent to the engine. While
    /// active the engine gets the new list without a restart.
    pub async fn toggle_app_block(&self, app_identifier: &str) -> Result<bool> {
        let now_blocked = {
            let mut blocked = self.blocked.lock().await;
            let now_blocked = blocked.toggle(app_identifier);
            if let Err(err) = self.settings.save_blocked_apps(&blocked.to_vec()).await {
                log_warn!("[monitoring] failed to persist blocked apps: {err:#}");
            }
            now_blocked
        };
        log_debug!("[monitoring] {app_identifier} blocked={now_blocked}");

        let _guard = self.op_lock.lock().await;
        if self.state().is_active() {
            let apps = self.blocked.lock().await.to_vec();
            self.engine
                .set_blocked_apps(&apps)
                .await
                .map_err(|err| BlockerError::engine(EngineOperation::SetBlockedApps, err))?;
        }

        Ok(now_blocked)
    }

    /// Schedule a stop/settle/start cycle. Calls within the debounce window
    /// replace each other; only the last one runs. Ignored unless active.
    pub fn restart_debounced(&self) {
        if !self.state().is_active() {
            log_debug!("[monitoring] restart skipped, state is {:?}", self.state());
            return;
        }

        let coordinator = self.clone();
        self.restart.schedule(async move {
            coordinator.run_restart().await;
        });
    }

    /// Feed a host lifecycle change; a resume while active schedules a restart.
    pub fn handle_app_state(&self, next: AppLifecycle) {
        let transition = match self.lifecycle.lock() {
            Ok(mut tracker) => tracker.observe(next),
            Err(poisoned) => poisoned.into_inner().observe(next),
        };

        if transition == LifecycleTransition::Resumed && self.state().is_active() {
            log_info!("[monitoring] host resumed while active, scheduling restart");
            self.restart_debounced();
        }
    }

    /// Drop any restart still waiting out its debounce window.
    pub fn shutdown(&self) {
        self.restart.cancel();
    }

    async fn start_locked(&self, token: u64) -> Result<MonitoringState> {
        let apps = self.blocked.lock().await.to_vec();
        if apps.is_empty() {
            log_info!("[monitoring] nothing to block, not starting");
            return Ok(self.state());
        }

        let already_active = self.state().is_active();
        if !already_active {
            self.write_state(token, MonitoringState::Starting);
        }

        if let Err(err) = self.engine.set_blocked_apps(&apps).await {
            log_error!("[monitoring] setBlockedApps failed: {err}");
            if !already_active {
                self.write_state(token, MonitoringState::Stopped);
            }
            return Err(BlockerError::engine(EngineOperation::SetBlockedApps, err));
        }

        if already_active {
            log_debug!("[monitoring] already active, re-synced {} apps", apps.len());
            return Ok(MonitoringState::Active);
        }

        if let Err(err) = self.engine.start_monitoring().await {
            log_error!("[monitoring] startMonitoring failed: {err}");
            self.write_state(token, MonitoringState::Stopped);
            return Err(BlockerError::engine(EngineOperation::StartMonitoring, err));
        }

        if !self.write_state(token, MonitoringState::Active) {
            return Ok(self.state());
        }

        if let Err(err) = self.settings.save_monitoring_enabled(true).await {
            log_warn!("[monitoring] failed to persist monitoring flag: {err:#}");
        }
        log_info!("[monitoring] active with {} blocked apps", apps.len());
        Ok(MonitoringState::Active)
    }

    /// Restart sequence run once the debounce window closes. Failures are
    /// logged only; the next resume or a manual toggle recovers.
    async fn run_restart(&self) {
        let _guard = self.op_lock.lock().await;
        if !self.state().is_active() {
            log_debug!("[monitoring] restart dropped, no longer active");
            return;
        }

        let token = self.clock.issue();
        let seen = self.clock.requested();
        log_info!("[monitoring] restarting engine");

        self.write_state(token, MonitoringState::Stopping);
        if let Err(err) = self.engine.stop_monitoring().await {
            log_warn!("[monitoring] stop during restart failed: {err}");
        }

        tokio::time::sleep(self.settle).await;

        // A user start/stop queued behind us decides what happens next.
        if let Err(err) = self.clock.check_requests(seen) {
            log_debug!("[monitoring] restart superseded: {err}");
            self.write_state(token, MonitoringState::Stopped);
            return;
        }

        self.write_state(token, MonitoringState::Stopped);
        match self.start_locked(token).await {
            Ok(state) => log_info!("[monitoring] restart complete, state {state:?}"),
            Err(err) => log_warn!("[monitoring] restart failed: {err}"),
        }
    }

    /// Writes `next` only if `token` is still the newest operation.
    fn write_state(&self, token: u64, next: MonitoringState) -> bool {
        match self.clock.check(token) {
            Ok(()) => {
                self.state.send_replace(next);
                true
            }
            Err(err) => {
                log_debug!("[monitoring] discarding {next:?}: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCall, SimulatedEngine};
    use crate::models::PermissionState;
    use crate::settings::MemorySettingsStore;

    const GRANTED: PermissionState = PermissionState {
        usage: true,
        overlay: true,
    };

    fn setup(saved: &[&str]) -> (MonitoringCoordinator, SimulatedEngine, Arc<MemorySettingsStore>) {
        let engine = SimulatedEngine::new();
        engine.set_permissions(GRANTED);
        let settings = Arc::new(MemorySettingsStore::with_blocked_apps(saved));
        let coordinator = MonitoringCoordinator::new(
            Arc::new(engine.clone()),
            settings.clone(),
            &BlockerConfig::default(),
        );
        (coordinator, engine, settings)
    }

    #[tokio::test]
    async fn initialize_falls_back_to_defaults_and_saves_them() {
        let (coordinator, _engine, settings) = setup(&[]);
        let blocked = coordinator.initialize().await;

        assert_eq!(blocked, BlockedAppSet::defaults());
        assert_eq!(
            settings.get_blocked_apps().await.unwrap(),
            Some(BlockedAppSet::defaults().to_vec())
        );
    }

    #[tokio::test]
    async fn start_syncs_list_before_starting() {
        let (coordinator, engine, settings) = setup(&["b", "a"]);
        coordinator.initialize().await;

        let state = coordinator.start().await.unwrap();

        assert_eq!(state, MonitoringState::Active);
        assert_eq!(
            engine.calls(),
            vec![
                EngineCall::SetBlockedApps(vec!["a".into(), "b".into()]),
                EngineCall::StartMonitoring,
            ]
        );
        assert_eq!(settings.stored_monitoring_enabled(), Some(true));
    }

    #[tokio::test]
    async fn start_with_empty_set_stays_stopped() {
        let (coordinator, engine, _settings) = setup(&["a"]);
        coordinator.initialize().await;
        coordinator.toggle_app_block("a").await.unwrap();

        let state = coordinator.start().await.unwrap();

        assert_eq!(state, MonitoringState::Stopped);
        assert_eq!(engine.count(EngineOperation::StartMonitoring), 0);
        assert_eq!(engine.count(EngineOperation::SetBlockedApps), 0);
    }

    #[tokio::test]
    async fn start_while_active_only_resyncs() {
        let (coordinator, engine, _settings) = setup(&["a"]);
        coordinator.initialize().await;
        coordinator.start().await.unwrap();
        engine.clear_calls();

        assert_eq!(coordinator.start().await.unwrap(), MonitoringState::Active);
        assert_eq!(
            engine.calls(),
            vec![EngineCall::SetBlockedApps(vec!["a".into()])]
        );
    }

    #[tokio::test]
    async fn failed_start_never_reports_active() {
        let (coordinator, engine, _settings) = setup(&["a"]);
        coordinator.initialize().await;
        engine.fail(EngineOperation::StartMonitoring, "boom");

        let err = coordinator.start().await.unwrap_err();

        assert_eq!(err.operation(), Some(EngineOperation::StartMonitoring));
        assert_eq!(coordinator.state(), MonitoringState::Stopped);
    }

    #[tokio::test]
    async fn failed_sync_skips_engine_start() {
        let (coordinator, engine, _settings) = setup(&["a"]);
        coordinator.initialize().await;
        engine.fail(EngineOperation::SetBlockedApps, "bridge down");

        let err = coordinator.start().await.unwrap_err();

        assert_eq!(err.operation(), Some(EngineOperation::SetBlockedApps));
        assert_eq!(engine.count(EngineOperation::StartMonitoring), 0);
        assert_eq!(coordinator.state(), MonitoringState::Stopped);
    }

    #[tokio::test]
    async fn stop_lands_stopped_even_when_engine_fails() {
        let (coordinator, engine, settings) = setup(&["a"]);
        coordinator.initialize().await;
        coordinator.start().await.unwrap();
        engine.fail(EngineOperation::StopMonitoring, "gone");

        let err = coordinator.stop().await.unwrap_err();

        assert_eq!(err.to_string(), "stopMonitoring failed: gone");
        assert_eq!(coordinator.state(), MonitoringState::Stopped);
        assert_eq!(settings.stored_monitoring_enabled(), Some(false));
    }

    #[tokio::test]
    async fn toggle_while_active_resyncs_without_restart() {
        let (coordinator, engine, settings) = setup(&["A", "B"]);
        coordinator.initialize().await;
        coordinator.start().await.unwrap();
        engine.clear_calls();

        assert!(coordinator.toggle_app_block("C").await.unwrap());

        assert_eq!(
            engine.calls(),
            vec![EngineCall::SetBlockedApps(vec![
                "A".into(),
                "B".into(),
                "C".into()
            ])]
        );
        assert_eq!(
            settings.get_blocked_apps().await.unwrap(),
            Some(vec!["A".into(), "B".into(), "C".into()])
        );
    }

    #[tokio::test]
    async fn toggle_while_active_surfaces_sync_failure() {
        let (coordinator, engine, settings) = setup(&["A", "B"]);
        coordinator.initialize().await;
        coordinator.start().await.unwrap();
        engine.fail(EngineOperation::SetBlockedApps, "bridge down");

        let err = coordinator.toggle_app_block("C").await.unwrap_err();

        assert_eq!(err.operation(), Some(EngineOperation::SetBlockedApps));
        assert_eq!(
            settings.get_blocked_apps().await.unwrap(),
            Some(vec!["A".into(), "B".into(), "C".into()])
        );
        assert_eq!(coordinator.state(), MonitoringState::Active);
        assert_eq!(engine.count(EngineOperation::StopMonitoring), 0);
    }

    #[tokio::test]
    async fn toggle_while_stopped_only_persists() {
        let (coordinator, engine, settings) = setup(&["A"]);
        coordinator.initialize().await;

        assert!(!coordinator.toggle_app_block("A").await.unwrap());

        assert!(engine.calls().is_empty());
        assert_eq!(settings.get_blocked_apps().await.unwrap(), Some(vec![]));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_burst_restarts_once() {
        let (coordinator, engine, _settings) = setup(&["a"]);
        coordinator.initialize().await;
        coordinator.start().await.unwrap();
        engine.clear_calls();

        for _ in 0..4 {
            coordinator.handle_app_state(AppLifecycle::Background);
            coordinator.handle_app_state(AppLifecycle::Active);
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(engine.count(EngineOperation::StopMonitoring), 1);
        assert_eq!(engine.count(EngineOperation::StartMonitoring), 1);
        assert_eq!(coordinator.state(), MonitoringState::Active);
        assert!(engine.is_monitoring());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_waits_out_the_settle_delay() {
        let (coordinator, engine, _settings) = setup(&["a"]);
        coordinator.initialize().await;
        coordinator.start().await.unwrap();
        engine.clear_calls();

        coordinator.restart_debounced();
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(engine.calls(), vec![EngineCall::StopMonitoring]);

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(engine.count(EngineOperation::StartMonitoring), 1);
        assert_eq!(coordinator.state(), MonitoringState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_settle_wins_over_restart() {
        let (coordinator, engine, _settings) = setup(&["a"]);
        coordinator.initialize().await;
        coordinator.start().await.unwrap();
        engine.clear_calls();

        coordinator.restart_debounced();
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        coordinator.stop().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(engine.count(EngineOperation::StartMonitoring), 0);
        assert_eq!(coordinator.state(), MonitoringState::Stopped);
        assert!(!engine.is_monitoring());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_a_pending_restart() {
        let (coordinator, engine, _settings) = setup(&["a"]);
        coordinator.initialize().await;
        coordinator.start().await.unwrap();

        coordinator.restart_debounced();
        coordinator.stop().await.unwrap();
        engine.clear_calls();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(engine.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn resume_while_stopped_does_nothing() {
        let (coordinator, engine, _settings) = setup(&["a"]);
        coordinator.initialize().await;

        coordinator.handle_app_state(AppLifecycle::Background);
        coordinator.handle_app_state(AppLifecycle::Active);
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(engine.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_stop_does_not_clobber_newer_start() {
        let (coordinator, engine, _settings) = setup(&["a"]);
        coordinator.initialize().await;
        coordinator.start().await.unwrap();
        engine.set_latency(EngineOperation::StopMonitoring, Duration::from_millis(500));

        let stopping = coordinator.clone();
        let stop = tokio::spawn(async move { stopping.stop().await });
        tokio::task::yield_now().await;
        let start = coordinator.start().await.unwrap();
        stop.await.unwrap().unwrap();

        assert_eq!(start, MonitoringState::Active);
        assert_eq!(coordinator.state(), MonitoringState::Active);
        assert!(engine.is_monitoring());
    }

    /// Holds the lifecycle lock with a slow toggle sync while a stop and a
    /// start queue up behind it (stop first when `first_is_stop`).
    async fn queue_behind_slow_sync(
        coordinator: &MonitoringCoordinator,
        engine: &SimulatedEngine,
        first_is_stop: bool,
    ) {
        coordinator.initialize().await;
        coordinator.start().await.unwrap();
        engine.set_latency(EngineOperation::SetBlockedApps, Duration::from_millis(500));
        engine.clear_calls();

        let toggling = coordinator.clone();
        let toggle = tokio::spawn(async move { toggling.toggle_app_block("b").await });
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let queued = coordinator.clone();
        let first = tokio::spawn(async move {
            if first_is_stop {
                queued.stop().await.map(|()| MonitoringState::Stopped)
            } else {
                queued.start().await
            }
        });
        tokio::task::yield_now().await;

        if first_is_stop {
            coordinator.start().await.unwrap();
        } else {
            coordinator.stop().await.unwrap();
        }
        first.await.unwrap().unwrap();
        toggle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn queued_stop_then_start_ends_active() {
        let (coordinator, engine, settings) = setup(&["a"]);

        queue_behind_slow_sync(&coordinator, &engine, true).await;

        assert_eq!(coordinator.state(), MonitoringState::Active);
        assert!(engine.is_monitoring());
        assert_eq!(settings.stored_monitoring_enabled(), Some(true));
        assert_eq!(
            engine.calls(),
            vec![
                EngineCall::SetBlockedApps(vec!["a".into(), "b".into()]),
                EngineCall::StopMonitoring,
                EngineCall::SetBlockedApps(vec!["a".into(), "b".into()]),
                EngineCall::StartMonitoring,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn queued_start_then_stop_ends_stopped() {
        let (coordinator, engine, settings) = setup(&["a"]);

        queue_behind_slow_sync(&coordinator, &engine, false).await;

        assert_eq!(coordinator.state(), MonitoringState::Stopped);
        assert!(!engine.is_monitoring());
        assert_eq!(settings.stored_monitoring_enabled(), Some(false));
        assert_eq!(engine.calls().last(), Some(&EngineCall::StopMonitoring));
    }
}
