use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::InterstitialSettings;

/// Key-value persistence for the blocked-app list and the monitoring flag.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// `None` when nothing was ever saved.
    async fn get_blocked_apps(&self) -> Result<Option<Vec<String>>>;

    async fn save_blocked_apps(&self, app_identifiers: &[String]) -> Result<()>;

    /// Defaults to `true` when never written, so monitoring comes back on
    /// after onboarding.
    async fn get_monitoring_enabled(&self) -> Result<bool>;

    async fn save_monitoring_enabled(&self, enabled: bool) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserSettings {
    #[serde(default)]
    blocked_apps: Option<Vec<String>>,
    #[serde(default)]
    monitoring_enabled: Option<bool>,
    #[serde(default)]
    interstitial: InterstitialSettings,
}

fn read_guard<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("settings lock poisoned"))
}

fn write_guard<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("settings lock poisoned"))
}

/// Settings persisted as a pretty-printed JSON file.
pub struct JsonSettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl JsonSettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(data) => data,
                Err(err) => {
                    log::warn!(
                        "[settings] {} is not valid settings JSON ({err}); starting from defaults",
                        path.display()
                    );
                    UserSettings::default()
                }
            }
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn interstitial(&self) -> Result<InterstitialSettings> {
        Ok(read_guard(&self.data)?.interstitial.clone())
    }

    pub fn update_interstitial(&self, settings: InterstitialSettings) -> Result<()> {
        let mut guard = write_guard(&self.data)?;
        guard.interstitial = settings.normalized();
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        let mut guard = write_guard(&self.data)?;
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn get_blocked_apps(&self) -> Result<Option<Vec<String>>> {
        Ok(read_guard(&self.data)?.blocked_apps.clone())
    }

    async fn save_blocked_apps(&self, app_identifiers: &[String]) -> Result<()> {
        let mut guard = write_guard(&self.data)?;
        guard.blocked_apps = Some(app_identifiers.to_vec());
        self.persist(&guard)
    }

    async fn get_monitoring_enabled(&self) -> Result<bool> {
        Ok(read_guard(&self.data)?.monitoring_enabled.unwrap_or(true))
    }

    async fn save_monitoring_enabled(&self, enabled: bool) -> Result<()> {
        let mut guard = write_guard(&self.data)?;
        guard.monitoring_enabled = Some(enabled);
        self.persist(&guard)
    }
}

/// Non-persistent store; also lets callers simulate write failures.
#[derive(Default)]
pub struct MemorySettingsStore {
    data: RwLock<UserSettings>,
    fail_writes: RwLock<bool>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blocked_apps(apps: &[&str]) -> Self {
        let store = Self::default();
        if let Ok(mut guard) = store.data.write() {
            guard.blocked_apps = Some(apps.iter().map(|app| app.to_string()).collect());
        }
        store
    }

    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut guard) = self.fail_writes.write() {
            *guard = fail;
        }
    }

    /// Monitoring flag as stored, `None` when never written.
    pub fn stored_monitoring_enabled(&self) -> Option<bool> {
        self.data.read().ok().and_then(|guard| guard.monitoring_enabled)
    }

    fn check_writable(&self) -> Result<()> {
        if *read_guard(&self.fail_writes)? {
            return Err(anyhow!("settings store is read-only"));
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get_blocked_apps(&self) -> Result<Option<Vec<String>>> {
        Ok(read_guard(&self.data)?.blocked_apps.clone())
    }

    async fn save_blocked_apps(&self, app_identifiers: &[String]) -> Result<()> {
        self.check_writable()?;
        write_guard(&self.data)?.blocked_apps = Some(app_identifiers.to_vec());
        Ok(())
    }

    async fn get_monitoring_enabled(&self) -> Result<bool> {
        Ok(read_guard(&self.data)?.monitoring_enabled.unwrap_or(true))
    }

    async fn save_monitoring_enabled(&self, enabled: bool) -> Result<()> {
        self.check_writable()?;
        write_guard(&self.data)?.monitoring_enabled = Some(enabled);
        Ok(())
    }
}
