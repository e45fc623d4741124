use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::InterstitialSettings;

/// Goals beyond this many are not shown.
pub const MAX_GOALS: usize = 10;

pub const EMPTY_GOALS_TEXT: &str = "Set your goals to see them here";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InterstitialVariant {
    #[default]
    Standard,
    Breathing,
}

impl InterstitialVariant {
    pub fn accessibility_label(&self) -> &'static str {
        match self {
            InterstitialVariant::Standard => "Mindful breathing icon",
            InterstitialVariant::Breathing => "Breathing exercise",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CountdownState {
    Running,
    Paused,
    Completed,
}

/// What one tick changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub seconds_remaining: u32,
    /// Seconds to read out to a screen reader, if this tick warrants it.
    pub announce: Option<u32>,
    /// True only on the tick that reached zero.
    pub completed: bool,
}

/// Whether `seconds` remaining gets read out: every 4 seconds, and each of
/// the final 3.
pub fn should_announce(seconds: u32) -> bool {
    seconds <= 3 || seconds % 4 == 0
}

pub fn announcement_text(seconds: u32) -> String {
    format!("{seconds} seconds remaining")
}

/// Countdown shown over a blocked app. Pure state; the controller drives it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterstitialSession {
    pub id: Uuid,
    pub app_identifier: String,
    pub total_duration_seconds: u32,
    pub seconds_remaining: u32,
    pub state: CountdownState,
    pub variant: InterstitialVariant,
    pub message: String,
    pub goals: Vec<String>,
    /// Progress captured when the countdown was last paused.
    #[serde(skip)]
    frozen_progress: Option<f64>,
}

impl InterstitialSession {
    pub fn new(app_identifier: impl Into<String>, settings: &InterstitialSettings) -> Self {
        let settings = settings.clone().normalized();
        let total = settings.delay_seconds;
        Self {
            id: Uuid::new_v4(),
            app_identifier: app_identifier.into(),
            total_duration_seconds: total,
            seconds_remaining: total,
            state: CountdownState::Running,
            variant: settings.variant,
            message: settings.message,
            goals: settings.goals.into_iter().take(MAX_GOALS).collect(),
            frozen_progress: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == CountdownState::Running
    }

    pub fn is_completed(&self) -> bool {
        self.state == CountdownState::Completed
    }

    /// One second elapsed. `None` unless running.
    pub fn tick(&mut self) -> Option<TickOutcome> {
        if !self.is_running() {
            return None;
        }

        self.seconds_remaining = self.seconds_remaining.saturating_sub(1);
        let completed = self.seconds_remaining == 0;
        if completed {
            self.state = CountdownState::Completed;
        }

        Some(TickOutcome {
            seconds_remaining: self.seconds_remaining,
            announce: should_announce(self.seconds_remaining).then_some(self.seconds_remaining),
            completed,
        })
    }

    /// Fraction of the countdown elapsed, 0.0..=1.0. Frozen while paused.
    pub fn progress(&self) -> f64 {
        if let Some(frozen) = self.frozen_progress {
            return frozen;
        }
        if self.total_duration_seconds == 0 {
            return 1.0;
        }
        let elapsed = self.total_duration_seconds - self.seconds_remaining;
        f64::from(elapsed) / f64::from(self.total_duration_seconds)
    }

    /// Returns false if the countdown was not running.
    pub fn pause(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.frozen_progress = Some(self.progress());
        self.state = CountdownState::Paused;
        true
    }

    /// Resume a paused countdown. Returns how long the progress animation
    /// should take to reach 100% from where it was frozen.
    pub fn resume(&mut self) -> Option<Duration> {
        if self.state != CountdownState::Paused {
            return None;
        }
        let fraction = self.frozen_progress.take().unwrap_or_else(|| self.progress());
        self.state = CountdownState::Running;

        let total_ms = f64::from(self.total_duration_seconds) * 1000.0;
        let remaining_ms = (total_ms * (1.0 - fraction)).round().max(0.0);
        Some(Duration::from_millis(remaining_ms as u64))
    }

    /// Goal lines to render; a placeholder line when there are none.
    pub fn goal_lines(&self) -> Vec<&str> {
        if self.goals.is_empty() {
            vec![EMPTY_GOALS_TEXT]
        } else {
            self.goals.iter().map(String::as_str).collect()
        }
    }
}
