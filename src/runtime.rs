use std::sync::{Arc, Mutex as StdMutex, MutexGuard, RwLock};

use anyhow::{anyhow, Result as AnyResult};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::{BlockerConfig, InterstitialSettings},
    detection::{DetectionBus, RecentApps},
    engine::EnforcementEngine,
    error::{BlockerError, EngineOperation, Result},
    interstitial::{Accessibility, InterstitialController, InterstitialSession},
    lifecycle::AppLifecycle,
    models::{filter_installed_apps, BlockedAppEvent, DetectedAppEvent, InstalledApp},
    monitoring::{MonitoringCoordinator, MonitoringState},
    permissions::PermissionGate,
    settings::SettingsStore,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

type InterstitialSlot = Arc<Mutex<Option<InterstitialController>>>;

/// Wires the coordination core together: one engine, one settings store, one
/// detection bus, and the components listening to them.
///
/// Construction spawns the bus listeners, so it must happen inside a tokio
/// runtime. Call [`BlockerRuntime::shutdown`] to tear everything down.
pub struct BlockerRuntime {
    engine: Arc<dyn EnforcementEngine>,
    settings: Arc<dyn SettingsStore>,
    bus: DetectionBus,
    coordinator: MonitoringCoordinator,
    gate: PermissionGate,
    recent: Arc<StdMutex<RecentApps>>,
    interstitial: InterstitialSlot,
    interstitial_settings: Arc<RwLock<InterstitialSettings>>,
    accessibility: Arc<dyn Accessibility>,
    cancel: CancellationToken,
    listeners: StdMutex<Vec<JoinHandle<()>>>,
}

impl BlockerRuntime {
    pub fn new(
        engine: Arc<dyn EnforcementEngine>,
        settings: Arc<dyn SettingsStore>,
        bus: DetectionBus,
        accessibility: Arc<dyn Accessibility>,
        config: BlockerConfig,
    ) -> AnyResult<Self> {
        let detected = bus
            .subscribe_app_detected()
            .ok_or_else(|| anyhow!("detection bus already shut down"))?;
        let blocked = bus
            .subscribe_blocked_app_opened()
            .ok_or_else(|| anyhow!("detection bus already shut down"))?;

        let coordinator = MonitoringCoordinator::new(engine.clone(), settings.clone(), &config);
        let gate = PermissionGate::new(engine.clone(), coordinator.clone());

        let runtime = Self {
            engine,
            settings,
            bus,
            coordinator,
            gate,
            recent: Arc::new(StdMutex::new(RecentApps::new(config.recent_apps_capacity))),
            interstitial: Arc::new(Mutex::new(None)),
            interstitial_settings: Arc::new(RwLock::new(config.interstitial.normalized())),
            accessibility,
            cancel: CancellationToken::new(),
            listeners: StdMutex::new(Vec::new()),
        };

        let detected_task = runtime.spawn_detected_listener(detected);
        let blocked_task = runtime.spawn_blocked_listener(blocked);
        runtime.listener_slot().extend([detected_task, blocked_task]);

        log_info!("[runtime] ready");
        Ok(runtime)
    }

    pub fn bus(&self) -> &DetectionBus {
        &self.bus
    }

    pub fn coordinator(&self) -> &MonitoringCoordinator {
        &self.coordinator
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    /// Recent detections, newest first.
    pub fn recent_apps(&self) -> Vec<DetectedAppEvent> {
        lock_recent(&self.recent).newest_first()
    }

    pub async fn active_interstitial(&self) -> Option<InterstitialSession> {
        let controller = self.interstitial.lock().await.clone()?;
        Some(controller.snapshot().await)
    }

    pub fn interstitial_settings(&self) -> InterstitialSettings {
        match self.interstitial_settings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Applies to the next interstitial; one already showing keeps its own.
    pub fn set_interstitial_settings(&self, settings: InterstitialSettings) {
        let settings = settings.normalized();
        match self.interstitial_settings.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }

    /// Launch-time restore: if monitoring was left on (the default) and usage
    /// access is still granted, start it again. Failures are logged only.
    pub async fn restore_monitoring(&self) -> Option<MonitoringState> {
        let enabled = match self.settings.get_monitoring_enabled().await {
            Ok(enabled) => enabled,
            Err(err) => {
                log_warn!("[runtime] could not read monitoring flag: {err:#}");
                return None;
            }
        };
        if !enabled {
            log_info!("[runtime] monitoring was turned off, not restoring");
            return None;
        }

        match self.engine.is_usage_access_granted().await {
            Ok(true) => {}
            Ok(false) => {
                log_info!("[runtime] usage access missing, not restoring monitoring");
                return None;
            }
            Err(err) => {
                let err = BlockerError::engine(EngineOperation::IsUsageAccessGranted, err);
                log_warn!("[runtime] {err}");
                return None;
            }
        }

        self.coordinator.initialize().await;
        match self.coordinator.start().await {
            Ok(state) => Some(state),
            Err(err) => {
                log_warn!("[runtime] restoring monitoring failed: {err}");
                None
            }
        }
    }

    /// Installed apps for the block-list picker, filtered by `query`.
    pub async fn installed_apps(&self, query: &str) -> Result<Vec<InstalledApp>> {
        let apps = self
            .engine
            .get_installed_apps()
            .await
            .map_err(|err| BlockerError::engine(EngineOperation::GetInstalledApps, err))?;

        Ok(filter_installed_apps(&apps, query)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Deliver one host lifecycle change to every component that cares.
    pub async fn handle_app_state(&self, next: AppLifecycle) {
        log_debug!("[runtime] host is now {next:?}");
        // Coordinator first, so a bootstrap run by the gate on this same
        // resume is not followed by a restart.
        self.coordinator.handle_app_state(next);
        self.gate.handle_app_state(next).await;

        let controller = self.interstitial.lock().await.clone();
        if let Some(controller) = controller {
            controller.handle_app_state(next).await;
        }
    }

    /// Show the pause screen for `event`. Returns false when one is already
    /// showing; the event is dropped in that case.
    pub async fn open_interstitial(&self, event: &BlockedAppEvent) -> bool {
        open_interstitial(
            &self.interstitial,
            &self.interstitial_settings,
            &self.accessibility,
            event,
        )
        .await
    }

    pub async fn dismiss_interstitial(&self) {
        if let Some(controller) = self.interstitial.lock().await.take() {
            controller.dismiss().await;
        }
    }

    /// Stop listeners, drop pending restarts, close the bus. Engine state is
    /// left as is.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.coordinator.shutdown();
        self.dismiss_interstitial().await;
        self.bus.shutdown();

        let handles: Vec<_> = self.listener_slot().drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                log_warn!("[runtime] listener ended abnormally: {err}");
            }
        }
        log_info!("[runtime] shut down");
    }

    fn spawn_detected_listener(
        &self,
        mut receiver: broadcast::Receiver<DetectedAppEvent>,
    ) -> JoinHandle<()> {
        let recent = self.recent.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = receiver.recv() => event,
                };

                match event {
                    Ok(event) => {
                        log_debug!("[detection] foreground: {}", event.label());
                        lock_recent(&recent).push(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log_warn!("[detection] missed {skipped} app detections");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_blocked_listener(
        &self,
        mut receiver: broadcast::Receiver<BlockedAppEvent>,
    ) -> JoinHandle<()> {
        let slot = self.interstitial.clone();
        let settings = self.interstitial_settings.clone();
        let accessibility = self.accessibility.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = receiver.recv() => event,
                };

                match event {
                    Ok(event) => {
                        open_interstitial(&slot, &settings, &accessibility, &event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log_warn!("[detection] missed {skipped} blocked-app events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn listener_slot(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn lock_recent(recent: &StdMutex<RecentApps>) -> MutexGuard<'_, RecentApps> {
    match recent.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn open_interstitial(
    slot: &InterstitialSlot,
    settings: &RwLock<InterstitialSettings>,
    accessibility: &Arc<dyn Accessibility>,
    event: &BlockedAppEvent,
) -> bool {
    let mut active = slot.lock().await;
    if active.is_some() {
        log_debug!(
            "[interstitial] already showing, ignoring {}",
            event.app_identifier
        );
        return false;
    }

    let settings = match settings.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    let session = InterstitialSession::new(event.app_identifier.clone(), &settings);

    let clear_slot = slot.clone();
    let on_complete = Box::new(move |id: Uuid| {
        tokio::spawn(async move {
            let mut active = clear_slot.lock().await;
            let finished = match active.as_ref() {
                Some(controller) => controller.id().await == id,
                None => false,
            };
            if finished {
                *active = None;
            }
        });
    });

    let controller = InterstitialController::start(session, accessibility.clone(), on_complete).await;
    *active = Some(controller);
    true
}
