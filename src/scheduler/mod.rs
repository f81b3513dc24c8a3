// Reminder Scheduler
//
// Runs the due-date check on a fixed interval. Stopped -> Running -> Stopped;
// a redundant start or stop only logs a warning.
//
// Cycles run one after another inside a single task, and missed ticks are
// skipped, so a slow cycle never overlaps the next one. stop() cancels the
// timer synchronously; a cycle already in flight finishes its writes, which
// the per-day reminder check makes idempotent.

use crate::config::SchedulerConfig;
use crate::dispatch::NotificationDispatcher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Report generated after one check cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    /// When the cycle started
    pub started_at: DateTime<Utc>,

    /// Reminders written, if the cycle succeeded
    pub reminders_created: Option<usize>,

    /// Duration of the cycle
    #[serde(with = "serde_duration_millis")]
    pub duration: Duration,

    /// Error message if the cycle failed
    pub error_message: Option<String>,
}

impl CheckReport {
    pub fn succeeded(&self) -> bool {
        self.error_message.is_none()
    }
}

// Custom serde module for Duration (serialize/deserialize as milliseconds)
mod serde_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Snapshot of the scheduler state
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_created: Option<usize>,
    pub last_error: Option<String>,
    pub checks_run: u64,
}

#[derive(Default)]
struct SchedulerState {
    status: SchedulerStatus,
    timer: Option<CancellationToken>,
    pending_start: Option<CancellationToken>,
}

struct Inner {
    dispatcher: NotificationDispatcher,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start(self: &Arc<Self>) -> bool {
        let token = {
            let mut state = self.state();
            if state.status.is_running {
                tracing::warn!("Reminder scheduler already running; start ignored");
                return false;
            }
            state.status.is_running = true;
            state.pending_start = None;

            let token = CancellationToken::new();
            state.timer = Some(token.clone());
            token
        };

        tracing::info!(
            "Starting reminder scheduler (interval {:?}, {} day lookahead)",
            self.config.check_interval,
            self.config.reminder_days
        );

        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.run_loop(token).await });
        true
    }

    fn stop(&self) -> bool {
        let mut state = self.state();
        if !state.status.is_running {
            tracing::warn!("Reminder scheduler is not running; stop ignored");
            return false;
        }

        if let Some(token) = state.timer.take() {
            token.cancel();
        }
        state.status.is_running = false;
        tracing::info!("Reminder scheduler stopped");
        true
    }

    async fn run_loop(self: Arc<Self>, token: CancellationToken) {
        let mut timer = interval(self.config.check_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                // First tick completes immediately
                _ = timer.tick() => {
                    self.run_check().await;
                }
            }
        }

        tracing::debug!("Reminder scheduler loop exited");
    }

    async fn run_check(&self) -> CheckReport {
        let started_at = Utc::now();
        let start = Instant::now();

        let result = self
            .dispatcher
            .dispatch_due_date_reminders(self.config.reminder_days)
            .await;

        let report = match result {
            Ok(created) => CheckReport {
                started_at,
                reminders_created: Some(created),
                duration: start.elapsed(),
                error_message: None,
            },
            Err(e) => {
                tracing::error!("Due-date check failed: {}", e);
                CheckReport {
                    started_at,
                    reminders_created: None,
                    duration: start.elapsed(),
                    error_message: Some(e.to_string()),
                }
            }
        };

        let mut state = self.state();
        let status = &mut state.status;
        // Keep last_check monotonic even if cycles finish out of order
        status.last_check = Some(match status.last_check {
            Some(previous) if previous > started_at => previous,
            _ => started_at,
        });
        status.last_created = report.reminders_created;
        status.last_error = report.error_message.clone();
        status.checks_run += 1;

        report
    }
}

/// Periodic due-date reminder scheduler
pub struct ReminderScheduler {
    inner: Arc<Inner>,
}

impl ReminderScheduler {
    /// Create a stopped scheduler
    pub fn new(dispatcher: NotificationDispatcher, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                dispatcher,
                config,
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    /// Start the timer and run one check immediately
    ///
    /// Returns false (with a warning) if already running.
    pub fn start(&self) -> bool {
        self.inner.start()
    }

    /// Cancel the timer
    ///
    /// Returns false (with a warning) if not running.
    pub fn stop(&self) -> bool {
        self.inner.stop()
    }

    /// Start after the configured startup delay
    ///
    /// Returns `None` when the scheduler is disabled in configuration.
    pub fn auto_start(&self) -> Option<JoinHandle<()>> {
        if !self.inner.config.enabled {
            tracing::info!("Reminder scheduler disabled; not starting");
            return None;
        }

        let token = CancellationToken::new();
        {
            let mut state = self.inner.state();
            if let Some(previous) = state.pending_start.replace(token.clone()) {
                previous.cancel();
            }
        }

        let delay = self.inner.config.startup_delay;
        let inner = Arc::clone(&self.inner);
        tracing::debug!("Reminder scheduler will start in {:?}", delay);

        Some(tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("Pending scheduler start cancelled");
                }
                _ = sleep(delay) => {
                    inner.start();
                }
            }
        }))
    }

    /// Teardown: cancel a pending auto-start and stop if running
    pub fn shutdown(&self) {
        let running = {
            let mut state = self.inner.state();
            if let Some(pending) = state.pending_start.take() {
                pending.cancel();
            }
            state.status.is_running
        };

        if running {
            self.inner.stop();
        }
    }

    /// Run one check cycle now, outside the timer
    pub async fn run_check_now(&self) -> CheckReport {
        self.inner.run_check().await
    }

    /// Whether the timer is active
    pub fn is_running(&self) -> bool {
        self.inner.state().status.is_running
    }

    /// Snapshot of the scheduler state
    pub fn status(&self) -> SchedulerStatus {
        self.inner.state().status.clone()
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
