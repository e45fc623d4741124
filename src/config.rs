use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::detection::RECENT_APPS_CAPACITY;
use crate::interstitial::InterstitialVariant;
use crate::models::BlockedAppSet;

pub const MIN_DELAY_SECONDS: u32 = 5;
pub const MAX_DELAY_SECONDS: u32 = 120;
pub const DEFAULT_DELAY_SECONDS: u32 = 15;
pub const DEFAULT_MESSAGE: &str = "Take a breath. Do you really need this right now?";

const DEBOUNCE_ENV: &str = "DOOMSCROLL_DEBOUNCE_MS";
const SETTLE_ENV: &str = "DOOMSCROLL_SETTLE_MS";
const DELAY_ENV: &str = "DOOMSCROLL_DELAY_SECS";

/// What the pause screen shows and for how long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InterstitialSettings {
    pub delay_seconds: u32,
    pub message: String,
    pub variant: InterstitialVariant,
    pub goals: Vec<String>,
}

impl Default for InterstitialSettings {
    fn default() -> Self {
        Self {
            delay_seconds: DEFAULT_DELAY_SECONDS,
            message: DEFAULT_MESSAGE.to_string(),
            variant: InterstitialVariant::Standard,
            goals: Vec::new(),
        }
    }
}

impl InterstitialSettings {
    /// Delay clamped to 5..=120 seconds, blank message replaced by the default.
    pub fn normalized(mut self) -> Self {
        self.delay_seconds = clamp_delay(self.delay_seconds);
        if self.message.trim().is_empty() {
            self.message = DEFAULT_MESSAGE.to_string();
        }
        self
    }
}

pub fn clamp_delay(seconds: u32) -> u32 {
    seconds.clamp(MIN_DELAY_SECONDS, MAX_DELAY_SECONDS)
}

/// Timing and defaults for the coordination core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BlockerConfig {
    /// Resume bursts inside this window collapse into one restart.
    pub restart_debounce_ms: u64,
    /// Pause between stopping and restarting the engine during a restart.
    pub restart_settle_ms: u64,
    pub recent_apps_capacity: usize,
    pub default_blocked_apps: Vec<String>,
    pub interstitial: InterstitialSettings,
}

impl Default for BlockerConfig {
    fn default() -> Self {
        Self {
            restart_debounce_ms: 1_000,
            restart_settle_ms: 800,
            recent_apps_capacity: RECENT_APPS_CAPACITY,
            default_blocked_apps: BlockedAppSet::defaults().to_vec(),
            interstitial: InterstitialSettings::default(),
        }
    }
}

impl BlockerConfig {
    /// Defaults, overridden by `DOOMSCROLL_DEBOUNCE_MS`, `DOOMSCROLL_SETTLE_MS`
    /// and `DOOMSCROLL_DELAY_SECS` when they parse.
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Applies the environment overrides on top of `self`.
    pub fn apply_env(mut self) -> Self {
        if let Some(ms) = env_number::<u64>(DEBOUNCE_ENV) {
            self.restart_debounce_ms = ms;
        }
        if let Some(ms) = env_number::<u64>(SETTLE_ENV) {
            self.restart_settle_ms = ms;
        }
        if let Some(secs) = env_number::<u32>(DELAY_ENV) {
            self.interstitial.delay_seconds = clamp_delay(secs);
        }
        self
    }

    pub fn restart_debounce(&self) -> Duration {
        Duration::from_millis(self.restart_debounce_ms)
    }

    pub fn restart_settle(&self) -> Duration {
        Duration::from_millis(self.restart_settle_ms)
    }

    pub fn default_blocked_set(&self) -> BlockedAppSet {
        self.default_blocked_apps.iter().cloned().collect()
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("[config] ignoring {key}={raw}: not a number");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_product() {
        let config = BlockerConfig::default();
        assert_eq!(config.restart_debounce(), Duration::from_secs(1));
        assert_eq!(config.restart_settle(), Duration::from_millis(800));
        assert_eq!(config.recent_apps_capacity, 10);
        assert_eq!(config.default_blocked_set(), BlockedAppSet::defaults());
        assert_eq!(config.interstitial.delay_seconds, 15);
    }

    #[test]
    fn delay_is_clamped() {
        assert_eq!(clamp_delay(1), 5);
        assert_eq!(clamp_delay(15), 15);
        assert_eq!(clamp_delay(999), 120);
    }

    #[test]
    fn blank_message_falls_back_to_default() {
        let settings = InterstitialSettings {
            message: "   ".into(),
            ..InterstitialSettings::default()
        }
        .normalized();
        assert_eq!(settings.message, DEFAULT_MESSAGE);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: BlockerConfig = serde_json::from_str(r#"{ "restartSettleMs": 50 }"#).unwrap();
        assert_eq!(config.restart_settle_ms, 50);
        assert_eq!(config.restart_debounce_ms, 1_000);
    }
}
