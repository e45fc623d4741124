use std::{sync::Arc, time::Duration};

use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, Instant},
};
use uuid::Uuid;

use crate::lifecycle::{AppLifecycle, LifecycleTracker, LifecycleTransition};

use super::{announcement_text, Accessibility, InterstitialSession};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

pub type CompletionCallback = Box<dyn FnOnce(Uuid) + Send + 'static>;

/// Drives one [`InterstitialSession`]: a one-second ticker that is aborted
/// while the host app is in the background, screen-reader announcements, and
/// a completion callback fired exactly once.
#[derive(Clone)]
pub struct InterstitialController {
    session: Arc<Mutex<InterstitialSession>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
    accessibility: Arc<dyn Accessibility>,
    on_complete: Arc<std::sync::Mutex<Option<CompletionCallback>>>,
    lifecycle: Arc<std::sync::Mutex<LifecycleTracker>>,
}

impl InterstitialController {
    /// Starts ticking right away. Must be called inside a tokio runtime.
    pub async fn start(
        session: InterstitialSession,
        accessibility: Arc<dyn Accessibility>,
        on_complete: CompletionCallback,
    ) -> Self {
        log_info!(
            "[interstitial] {} opened for {}s ({})",
            session.app_identifier,
            session.total_duration_seconds,
            session.id
        );

        let controller = Self {
            session: Arc::new(Mutex::new(session)),
            ticker: Arc::new(Mutex::new(None)),
            tick_interval: Duration::from_secs(1),
            accessibility,
            on_complete: Arc::new(std::sync::Mutex::new(Some(on_complete))),
            lifecycle: Arc::new(std::sync::Mutex::new(LifecycleTracker::default())),
        };
        controller.spawn_ticker().await;
        controller
    }

    pub async fn snapshot(&self) -> InterstitialSession {
        self.session.lock().await.clone()
    }

    pub async fn id(&self) -> Uuid {
        self.session.lock().await.id
    }

    /// Stop ticking and freeze progress. No-op unless running.
    pub async fn pause(&self) -> bool {
        let paused = self.session.lock().await.pause();
        if paused {
            self.cancel_ticker().await;
            log_debug!("[interstitial] paused");
        }
        paused
    }

    /// Continue a paused countdown. Returns the time left for the progress
    /// animation.
    pub async fn resume(&self) -> Option<Duration> {
        let animation = self.session.lock().await.resume()?;
        self.spawn_ticker().await;
        log_debug!("[interstitial] resumed, progress finishes in {animation:?}");
        Some(animation)
    }

    /// Tear down without completing. The completion callback is dropped unfired.
    pub async fn dismiss(&self) {
        self.cancel_ticker().await;
        let callback = match self.on_complete.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(callback);
        log_debug!("[interstitial] dismissed");
    }

    pub async fn handle_app_state(&self, next: AppLifecycle) {
        let transition = match self.lifecycle.lock() {
            Ok(mut tracker) => tracker.observe(next),
            Err(poisoned) => poisoned.into_inner().observe(next),
        };

        match transition {
            LifecycleTransition::Backgrounded => {
                self.pause().await;
            }
            LifecycleTransition::Resumed => {
                self.resume().await;
            }
            LifecycleTransition::Unchanged => {}
        }
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let session = self.session.clone();
        let accessibility = self.accessibility.clone();
        let on_complete = self.on_complete.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + tick_interval, tick_interval);
            loop {
                interval.tick().await;

                let (outcome, id) = {
                    let mut guard = session.lock().await;
                    (guard.tick(), guard.id)
                };
                let Some(outcome) = outcome else {
                    break;
                };

                if let Some(seconds) = outcome.announce {
                    // Checked every time; the user can turn the reader on mid-countdown.
                    if accessibility.is_screen_reader_enabled().await {
                        accessibility.announce(&announcement_text(seconds)).await;
                    }
                }

                if outcome.completed {
                    log_info!("[interstitial] countdown {id} complete");
                    let callback = match on_complete.lock() {
                        Ok(mut slot) => slot.take(),
                        Err(poisoned) => poisoned.into_inner().take(),
                    };
                    if let Some(callback) = callback {
                        callback(id);
                    }
                    break;
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterstitialSettings;
    use crate::interstitial::{CountdownState, RecordingAccessibility};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn countdown(seconds: u32) -> InterstitialSession {
        let settings = InterstitialSettings {
            delay_seconds: seconds,
            ..InterstitialSettings::default()
        };
        InterstitialSession::new("com.google.android.youtube", &settings)
    }

    fn counting_callback() -> (CompletionCallback, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let callback: CompletionCallback = Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (callback, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn runs_to_completion_and_announces() {
        let reader = Arc::new(RecordingAccessibility::new(true));
        let (callback, fired) = counting_callback();
        let controller = InterstitialController::start(countdown(15), reader.clone(), callback).await;

        time::sleep(Duration::from_millis(20_500)).await;

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.seconds_remaining, 0);
        assert_eq!(snapshot.state, CountdownState::Completed);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(
            reader.announcements(),
            [12, 8, 4, 3, 2, 1, 0]
                .iter()
                .map(|n| format!("{n} seconds remaining"))
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn background_pauses_and_foreground_resumes() {
        let reader = Arc::new(RecordingAccessibility::new(false));
        let (callback, fired) = counting_callback();
        let controller = InterstitialController::start(countdown(15), reader, callback).await;

        time::sleep(Duration::from_millis(5_500)).await;
        controller.handle_app_state(AppLifecycle::Background).await;
        time::sleep(Duration::from_secs(30)).await;

        let paused = controller.snapshot().await;
        assert_eq!(paused.state, CountdownState::Paused);
        assert_eq!(paused.seconds_remaining, 10);

        assert_eq!(controller.resume().await, Some(Duration::from_secs(10)));
        time::sleep(Duration::from_millis(10_500)).await;

        assert_eq!(controller.snapshot().await.seconds_remaining, 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn screen_reader_is_checked_per_announcement() {
        let reader = Arc::new(RecordingAccessibility::new(false));
        let (callback, _fired) = counting_callback();
        let _controller = InterstitialController::start(countdown(15), reader.clone(), callback).await;

        // 12 and 8 pass silently
        time::sleep(Duration::from_millis(8_500)).await;
        reader.set_enabled(true);
        time::sleep(Duration::from_secs(10)).await;

        assert_eq!(
            reader.announcements(),
            vec![
                "4 seconds remaining",
                "3 seconds remaining",
                "2 seconds remaining",
                "1 seconds remaining",
                "0 seconds remaining",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_stops_ticking_without_completing() {
        let reader = Arc::new(RecordingAccessibility::new(false));
        let (callback, fired) = counting_callback();
        let controller = InterstitialController::start(countdown(15), reader, callback).await;

        time::sleep(Duration::from_millis(3_500)).await;
        controller.dismiss().await;
        time::sleep(Duration::from_secs(30)).await;

        assert_eq!(controller.snapshot().await.seconds_remaining, 12);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
