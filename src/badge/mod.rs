//! Unread notification badge
//!
//! While a session is active the poller refreshes the unread count right
//! away and then on a fixed interval. Logging out cancels the timer and
//! hides the badge. Any failed refresh also hides it.

use crate::auth::{AuthBroadcaster, Subscription};
use crate::error::{PortalError, Result};
use crate::storage::NotificationStore;
use crate::types::Session;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Largest count shown literally
pub const MAX_BADGE_COUNT: u64 = 99;

/// Text for the badge, or `None` when it should be hidden
pub fn badge_label(count: u64) -> Option<String> {
    match count {
        0 => None,
        n if n > MAX_BADGE_COUNT => Some(format!("{}+", MAX_BADGE_COUNT)),
        n => Some(n.to_string()),
    }
}

/// Rendering surface for the badge
pub trait BadgeSurface: Send + Sync {
    /// Show the badge with the given text
    fn show(&self, label: &str);

    /// Hide the badge
    fn hide(&self);
}

struct ActivePoll {
    user_id: String,
    token: CancellationToken,
}

/// Session-driven unread count poller
pub struct BadgePoller {
    store: Arc<dyn NotificationStore>,
    surface: Arc<dyn BadgeSurface>,
    poll_interval: Duration,
    runtime: Handle,
    active: Arc<Mutex<Option<ActivePoll>>>,
}

impl BadgePoller {
    /// Create a poller bound to the current Tokio runtime
    pub fn new(
        store: Arc<dyn NotificationStore>,
        surface: Arc<dyn BadgeSurface>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| PortalError::Other(format!("Badge poller needs a Tokio runtime: {}", e)))?;

        Ok(Self {
            store,
            surface,
            poll_interval,
            runtime,
            active: Arc::new(Mutex::new(None)),
        })
    }

    fn active(&self) -> MutexGuard<'_, Option<ActivePoll>> {
        lock_active(&self.active)
    }

    /// Subscribe this poller to session changes
    pub fn bind(self: &Arc<Self>, broadcaster: &AuthBroadcaster) -> Subscription {
        let poller = Arc::clone(self);
        broadcaster.subscribe(move |session| poller.on_session_change(session))
    }

    /// Start, restart or stop polling for a session transition
    pub fn on_session_change(&self, session: Option<&Session>) {
        match session {
            Some(session) => self.start_for(&session.id),
            None => {
                self.cancel();
                self.surface.hide();
            }
        }
    }

    /// User currently being polled
    pub fn polling_user(&self) -> Option<String> {
        self.active().as_ref().map(|poll| poll.user_id.clone())
    }

    fn start_for(&self, user_id: &str) {
        let token = {
            let mut active = self.active();
            if let Some(poll) = active.as_ref() {
                if poll.user_id == user_id {
                    debug!("Badge already polling for {}", user_id);
                    return;
                }
                poll.token.cancel();
            }

            let token = CancellationToken::new();
            *active = Some(ActivePoll {
                user_id: user_id.to_string(),
                token: token.clone(),
            });
            token
        };

        debug!("Badge polling started for {}", user_id);

        let store = Arc::clone(&self.store);
        let surface = Arc::clone(&self.surface);
        let active = Arc::clone(&self.active);
        let user_id = user_id.to_string();
        let period = self.poll_interval;

        self.runtime.spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = timer.tick() => {}
                }

                let label = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    label = fetch_label(store.as_ref(), &user_id) => label,
                };

                // Cancellation happens under the same lock, so a poll that
                // lost its session never touches the surface again
                let rendered = {
                    let _active = lock_active(&active);
                    let live = !token.is_cancelled();
                    if live {
                        render(surface.as_ref(), label.as_deref());
                    }
                    live
                };
                if !rendered {
                    break;
                }
            }

            debug!("Badge polling stopped for {}", user_id);
        });
    }

    fn cancel(&self) {
        if let Some(poll) = self.active().take() {
            poll.token.cancel();
        }
    }

    /// Refresh the badge once for a user
    pub async fn refresh_now(&self, user_id: &str) -> Option<String> {
        let label = fetch_label(self.store.as_ref(), user_id).await;
        render(self.surface.as_ref(), label.as_deref());
        label
    }
}

impl Drop for BadgePoller {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock_active(active: &Mutex<Option<ActivePoll>>) -> MutexGuard<'_, Option<ActivePoll>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Badge text for a user; a failed count reads as hidden
async fn fetch_label(store: &dyn NotificationStore, user_id: &str) -> Option<String> {
    match store.get_unread_count(user_id).await {
        Ok(count) => badge_label(count),
        Err(e) => {
            warn!("Unread count refresh failed for {}: {}", user_id, e);
            None
        }
    }
}

fn render(surface: &dyn BadgeSurface, label: Option<&str>) {
    match label {
        Some(text) => surface.show(text),
        None => surface.hide(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Form, NewNotification, Notification, NotificationId};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    #[derive(Default)]
    struct UnreadStore {
        unread: AtomicU64,
        fail: AtomicBool,
        polls: AtomicUsize,
        /// Per-user (count, latency) overrides
        slow_users: Mutex<HashMap<String, (u64, Duration)>>,
    }

    impl UnreadStore {
        fn slow_user(&self, user_id: &str, unread: u64, latency: Duration) {
            self.slow_users
                .lock()
                .unwrap()
                .insert(user_id.to_string(), (unread, latency));
        }
    }

    #[async_trait]
    impl NotificationStore for UnreadStore {
        async fn get_unread_count(&self, user_id: &str) -> Result<u64> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let slow = self.slow_users.lock().unwrap().get(user_id).copied();
            if let Some((unread, latency)) = slow {
                tokio::time::sleep(latency).await;
                return Ok(unread);
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(PortalError::StoreUnavailable("offline".into()));
            }
            Ok(self.unread.load(Ordering::SeqCst))
        }

        async fn create_notification(&self, _record: &NewNotification) -> Result<NotificationId> {
            Ok(NotificationId::new())
        }

        async fn create_due_reminder(
            &self,
            _record: &NewNotification,
        ) -> Result<Option<NotificationId>> {
            Ok(Some(NotificationId::new()))
        }

        async fn query_due_forms(&self, _target_date: NaiveDate) -> Result<Vec<Form>> {
            Ok(Vec::new())
        }

        async fn has_due_reminder(&self, _: &str, _: &str, _: NaiveDate) -> Result<bool> {
            Ok(false)
        }

        async fn list_notifications(&self, _: &str, _: usize) -> Result<Vec<Notification>> {
            Ok(Vec::new())
        }

        async fn mark_read(&self, _id: NotificationId) -> Result<()> {
            Ok(())
        }

        async fn mark_all_read(&self, _user_id: &str) -> Result<u64> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct RecordingSurface {
        shown: Mutex<Vec<String>>,
        hidden: AtomicUsize,
    }

    impl BadgeSurface for RecordingSurface {
        fn show(&self, label: &str) {
            self.shown.lock().unwrap().push(label.to_string());
        }

        fn hide(&self) {
            self.hidden.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn poller(
        unread: u64,
        period: Duration,
    ) -> (Arc<BadgePoller>, Arc<UnreadStore>, Arc<RecordingSurface>) {
        let store = Arc::new(UnreadStore::default());
        store.unread.store(unread, Ordering::SeqCst);
        let surface = Arc::new(RecordingSurface::default());
        let poller = BadgePoller::new(store.clone(), surface.clone(), period).unwrap();
        (Arc::new(poller), store, surface)
    }

    #[test]
    fn test_badge_label_thresholds() {
        assert_eq!(badge_label(0), None);
        assert_eq!(badge_label(1), Some("1".to_string()));
        assert_eq!(badge_label(99), Some("99".to_string()));
        assert_eq!(badge_label(100), Some("99+".to_string()));
        assert_eq!(badge_label(12_345), Some("99+".to_string()));
    }

    #[test]
    fn test_new_requires_runtime() {
        let store = Arc::new(UnreadStore::default());
        let surface = Arc::new(RecordingSurface::default());
        assert!(BadgePoller::new(store, surface, Duration::from_secs(30)).is_err());
    }

    #[tokio::test]
    async fn test_login_refreshes_immediately() {
        let (poller, _store, surface) = poller(3, Duration::from_secs(30));

        poller.on_session_change(Some(&Session::new("u1", "u1@example.org")));
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(*surface.shown.lock().unwrap(), vec!["3".to_string()]);
        assert_eq!(poller.polling_user().as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_logout_hides_and_stops_polling() {
        let (poller, store, surface) = poller(2, Duration::from_millis(20));

        poller.on_session_change(Some(&Session::new("u1", "u1@example.org")));
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(store.polls.load(Ordering::SeqCst) >= 2);

        poller.on_session_change(None);
        assert!(poller.polling_user().is_none());
        assert!(surface.hidden.load(Ordering::SeqCst) >= 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let after_logout = store.polls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.polls.load(Ordering::SeqCst), after_logout);
    }

    #[tokio::test]
    async fn test_logout_during_slow_refresh_keeps_badge_hidden() {
        let (poller, store, surface) = poller(0, Duration::from_secs(30));
        store.slow_user("u1", 7, Duration::from_millis(50));

        poller.on_session_change(Some(&Session::new("u1", "u1@example.org")));
        tokio::time::sleep(Duration::from_millis(10)).await;
        poller.on_session_change(None);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(surface.shown.lock().unwrap().is_empty());
        assert_eq!(surface.hidden.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_previous_user_count_never_overwrites_new_user() {
        let (poller, store, surface) = poller(0, Duration::from_secs(30));
        store.slow_user("u1", 7, Duration::from_millis(60));
        store.slow_user("u2", 2, Duration::from_millis(5));

        poller.on_session_change(Some(&Session::new("u1", "u1@example.org")));
        tokio::time::sleep(Duration::from_millis(10)).await;
        poller.on_session_change(Some(&Session::new("u2", "u2@example.org")));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(*surface.shown.lock().unwrap(), vec!["2".to_string()]);
        assert_eq!(poller.polling_user().as_deref(), Some("u2"));
    }

    #[tokio::test]
    async fn test_failed_refresh_hides_badge() {
        let (poller, store, surface) = poller(5, Duration::from_secs(30));
        store.fail.store(true, Ordering::SeqCst);

        assert_eq!(poller.refresh_now("u1").await, None);
        assert_eq!(surface.hidden.load(Ordering::SeqCst), 1);
        assert!(surface.shown.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_unread_hides_badge() {
        let (poller, _store, surface) = poller(0, Duration::from_secs(30));

        assert_eq!(poller.refresh_now("u1").await, None);
        assert_eq!(surface.hidden.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_same_user_does_not_restart_timer() {
        let (poller, store, _surface) = poller(1, Duration::from_secs(30));
        let session = Session::new("u1", "u1@example.org");

        poller.on_session_change(Some(&session));
        poller.on_session_change(Some(&session));
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bind_follows_broadcaster() {
        let (poller, _store, surface) = poller(150, Duration::from_secs(30));
        let broadcaster = AuthBroadcaster::new();
        let _sub = poller.bind(&broadcaster);

        broadcaster.initialize(Some(Session::new("u7", "u7@example.org")));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(*surface.shown.lock().unwrap(), vec!["99+".to_string()]);

        broadcaster.publish(None);
        assert!(poller.polling_user().is_none());
    }
}
