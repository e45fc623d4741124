//! Scripted walk-through of the blocker against the simulated engine.
//!
//! Usage: `doomscroll-sim [data-dir]`. Settings are written to
//! `<data-dir>/settings.json` (default: a `doomscroll-sim` folder in the
//! system temp dir). Set `DOOMSCROLL_DEBUG=1` for debug logs and
//! `DOOMSCROLL_DELAY_SECS=5` for a shorter countdown.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use doomscroll_stopper::{
    interstitial::RecordingAccessibility,
    models::{InstalledApp, PermissionStep}, utils::logging, AppLifecycle,
    BlockerConfig, BlockerRuntime, DetectionBus, GateStatus, JsonSettingsStore, SimulatedEngine,
};

const SETTINGS_FILE: &str = "settings.json";

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let data_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("doomscroll-sim"));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

    let store = Arc::new(JsonSettingsStore::new(data_dir.join(SETTINGS_FILE))?);
    let config = BlockerConfig {
        interstitial: store.interstitial()?,
        ..BlockerConfig::default()
    }
    .apply_env();
    let countdown = config.interstitial.clone().normalized().delay_seconds;

    let bus = DetectionBus::new();
    let engine = SimulatedEngine::with_bus(bus.clone()).with_installed_apps(vec![
        InstalledApp::new("Instagram", "com.instagram.android"),
        InstalledApp::new("YouTube", "com.google.android.youtube"),
        InstalledApp::new("Reddit", "com.reddit.frontpage"),
        InstalledApp::new("Chrome", "com.android.chrome"),
    ]);
    engine.set_grant_on_request(true);

    let reader = Arc::new(RecordingAccessibility::new(true));
    let runtime = BlockerRuntime::new(
        Arc::new(engine.clone()),
        store.clone(),
        bus,
        reader.clone(),
        config,
    )?;

    log::info!("settings at {}", store.path().display());

    // Onboarding: each grant happens in the OS settings app, so the gate
    // only learns about it when the host comes back to the foreground.
    let mut status = runtime.gate().advance().await;
    for _ in PermissionStep::ORDER {
        let GateStatus::Pending(step) = status else {
            break;
        };
        log::info!("requesting {} permission", step.as_str());
        runtime.gate().request_current().await;
        runtime.handle_app_state(AppLifecycle::Background).await;
        runtime.handle_app_state(AppLifecycle::Active).await;
        status = runtime.gate().status();
    }
    if status != GateStatus::Complete {
        anyhow::bail!("onboarding stuck at {status:?}");
    }
    log::info!(
        "onboarding complete, monitoring is {}",
        runtime.coordinator().state().label()
    );

    let pickable = runtime.installed_apps("red").await?;
    for app in &pickable {
        let blocked = runtime.coordinator().toggle_app_block(&app.package_name).await?;
        log::info!("{} blocked: {blocked}", app.app_name);
    }

    engine.simulate_foreground("com.android.chrome", Some("Chrome"));
    engine.simulate_foreground("com.reddit.frontpage", Some("Reddit"));
    engine.simulate_foreground("com.instagram.android", Some("Instagram"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    for event in runtime.recent_apps() {
        log::info!("recent: {} at {}", event.label(), event.timestamp);
    }

    if let Some(session) = runtime.active_interstitial().await {
        log::info!(
            "pause screen for {}: \"{}\" ({}s)",
            session.app_identifier,
            session.message,
            session.total_duration_seconds
        );
    }
    tokio::time::sleep(Duration::from_secs(u64::from(countdown) + 1)).await;
    log::info!("{} announcements made", reader.announcements().len());

    // A burst of resumes collapses into one engine restart.
    for _ in 0..3 {
        runtime.handle_app_state(AppLifecycle::Background).await;
        runtime.handle_app_state(AppLifecycle::Active).await;
    }
    tokio::time::sleep(Duration::from_secs(3)).await;
    log::info!(
        "after resume burst: monitoring is {}",
        runtime.coordinator().state().label()
    );

    runtime.coordinator().stop().await?;
    runtime.shutdown().await;
    Ok(())
}
