//! Notification dispatch
//!
//! Turns portal events (form shared, form due soon, user registered) into
//! notification records. Recipient lists are deduplicated before anything
//! is written, and per-recipient failures never abort the rest of a batch.

use crate::error::{PortalError, Result};
use crate::storage::NotificationStore;
use crate::types::{dedup_ids, Form, NewNotification, NotificationKind, NotificationPayload};
use chrono::{Days, Local, NaiveDate};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Writes notifications through a [`NotificationStore`]
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
}

impl NotificationDispatcher {
    /// Create a dispatcher over the given store
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// Notify every target user of a newly shared form, except its creator
    ///
    /// Creations run concurrently and all of them are awaited. Returns how
    /// many succeeded; individual failures are logged only.
    pub async fn dispatch_new_form(&self, form: &Form) -> Result<usize> {
        if form.id.trim().is_empty() {
            return Err(PortalError::Validation(
                "cannot dispatch notifications for a form without an id".to_string(),
            ));
        }

        let creator = form.created_by.trim();
        let recipients: Vec<String> = dedup_ids(&form.target_users)
            .into_iter()
            .filter(|recipient| recipient != creator)
            .collect();

        if recipients.is_empty() {
            debug!("Form {} has no recipients besides its creator", form.id);
            return Ok(0);
        }

        let payload = NotificationPayload {
            form_id: Some(form.id.clone()),
            title: format!("New form: {}", form.title),
            message: format!("{} shared a form with you", form.actor_name()),
            actor_id: Some(form.created_by.clone()),
            actor_name: Some(form.actor_name().to_string()),
        };

        let mut tasks = JoinSet::new();
        for recipient in recipients {
            let store = self.store.clone();
            let record = NewNotification::new(recipient, NotificationKind::NewForm, payload.clone());
            tasks.spawn(async move {
                let outcome = store.create_notification(&record).await;
                (record.recipient_id, outcome)
            });
        }

        let mut sent = 0;
        let mut failed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(_))) => sent += 1,
                Ok((recipient, Err(e))) => {
                    failed += 1;
                    warn!(
                        "Failed to notify {} about form {}: {}",
                        recipient, form.id, e
                    );
                }
                Err(e) => {
                    failed += 1;
                    warn!("Notification task for form {} aborted: {}", form.id, e);
                }
            }
        }

        info!(
            "Form {}: {} new-form notifications sent, {} failed",
            form.id, sent, failed
        );
        Ok(sent)
    }

    /// Create reminders for forms due `days` from today
    pub async fn dispatch_due_date_reminders(&self, days: u32) -> Result<usize> {
        self.dispatch_due_date_reminders_on(Local::now().date_naive(), days)
            .await
    }

    /// Create reminders for forms due `days` after `today`
    ///
    /// A reminder is written at most once per (form, recipient, today), even
    /// when checks overlap: the store insert is conditional on that key.
    /// When the existence check fails the recipient is skipped for this run.
    /// The form creator is a recipient like anyone else here. Only reminders
    /// actually written are counted.
    pub async fn dispatch_due_date_reminders_on(
        &self,
        today: NaiveDate,
        days: u32,
    ) -> Result<usize> {
        let target = today
            .checked_add_days(Days::new(u64::from(days)))
            .ok_or_else(|| {
                PortalError::Validation(format!("{} days after {} is out of range", days, today))
            })?;

        let forms = self.store.query_due_forms(target).await?;
        debug!("{} forms due on {}", forms.len(), target);

        let mut created = 0;
        for form in &forms {
            let payload = NotificationPayload {
                form_id: Some(form.id.clone()),
                title: reminder_title(&form.title, days),
                message: format!("\"{}\" is due on {}", form.title, target),
                actor_id: Some(form.created_by.clone()),
                actor_name: Some(form.actor_name().to_string()),
            };

            for recipient in dedup_ids(&form.target_users) {
                match self.store.has_due_reminder(&form.id, &recipient, today).await {
                    Ok(true) => {
                        debug!("Reminder for {} on form {} already sent today", recipient, form.id);
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(
                            "Skipping reminder for {} on form {}: existence check failed: {}",
                            recipient, form.id, e
                        );
                        continue;
                    }
                }

                let record =
                    NewNotification::new(recipient, NotificationKind::DueDate, payload.clone())
                        .on_day(today);
                match self.store.create_due_reminder(&record).await {
                    Ok(Some(_)) => created += 1,
                    Ok(None) => debug!(
                        "Reminder for {} on form {} was written by a concurrent check",
                        record.recipient_id, form.id
                    ),
                    Err(e) => warn!(
                        "Failed to create reminder for {} on form {}: {}",
                        record.recipient_id, form.id, e
                    ),
                }
            }
        }

        info!(
            "Due-date check for {}: {} reminders created across {} forms",
            target,
            created,
            forms.len()
        );
        Ok(created)
    }

    /// Greet a newly registered user
    ///
    /// Failures are logged and never reach the registration flow.
    pub async fn dispatch_welcome(&self, user_id: &str, email: &str) {
        let record = NewNotification::new(
            user_id,
            NotificationKind::Welcome,
            NotificationPayload {
                title: "Welcome to the portal".to_string(),
                message: format!("Your account {} is ready", email),
                ..Default::default()
            },
        );

        match self.store.create_notification(&record).await {
            Ok(id) => debug!("Welcome notification {} created for {}", id, user_id),
            Err(e) => warn!("Failed to create welcome notification for {}: {}", user_id, e),
        }
    }
}

fn reminder_title(title: &str, days: u32) -> String {
    match days {
        0 => format!("Due today: {}", title),
        1 => format!("Due tomorrow: {}", title),
        n => format!("Due in {} days: {}", n, title),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockNotificationStore;
    use crate::types::NotificationId;
    use chrono::Utc;

    fn form(id: &str, targets: &[&str], created_by: &str) -> Form {
        Form {
            id: id.to_string(),
            title: "Quarterly survey".to_string(),
            description: String::new(),
            due_date: None,
            target_users: targets.iter().map(|s| s.to_string()).collect(),
            is_public: false,
            created_by: created_by.to_string(),
            created_by_name: Some("Grace".to_string()),
            created_at: Utc::now(),
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 10).unwrap()
    }

    #[tokio::test]
    async fn test_new_form_dedups_and_skips_creator() {
        let mut store = MockNotificationStore::new();
        store
            .expect_create_notification()
            .withf(|record| {
                record.kind == NotificationKind::NewForm
                    && record.recipient_id != "owner"
                    && record.payload.form_id.as_deref() == Some("f1")
            })
            .times(2)
            .returning(|_| Ok(NotificationId::new()));

        let dispatcher = NotificationDispatcher::new(Arc::new(store));
        let sent = dispatcher
            .dispatch_new_form(&form("f1", &["a", "b", "a", "owner"], "owner"))
            .await
            .unwrap();

        assert_eq!(sent, 2);
    }

    #[tokio::test]
    async fn test_new_form_failure_does_not_abort_others() {
        let mut store = MockNotificationStore::new();
        store
            .expect_create_notification()
            .times(3)
            .returning(|record| {
                if record.recipient_id == "b" {
                    Err(PortalError::StoreUnavailable("write rejected".into()))
                } else {
                    Ok(NotificationId::new())
                }
            });

        let dispatcher = NotificationDispatcher::new(Arc::new(store));
        let sent = dispatcher
            .dispatch_new_form(&form("f1", &["a", "b", "c"], "owner"))
            .await
            .unwrap();

        assert_eq!(sent, 2);
    }

    #[tokio::test]
    async fn test_new_form_requires_id() {
        let store = MockNotificationStore::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(store));

        let err = dispatcher
            .dispatch_new_form(&form("", &["a"], "owner"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));
    }

    #[tokio::test]
    async fn test_reminders_skip_when_existence_check_fails() {
        let mut store = MockNotificationStore::new();
        store
            .expect_query_due_forms()
            .withf(|target| *target == NaiveDate::from_ymd_opt(2026, 5, 11).unwrap())
            .times(1)
            .returning(|_| Ok(vec![form("f1", &["u1", "u2"], "u1")]));
        store
            .expect_has_due_reminder()
            .times(2)
            .returning(|_, recipient, _| {
                if recipient == "u1" {
                    Err(PortalError::StoreUnavailable("read timeout".into()))
                } else {
                    Ok(false)
                }
            });
        store
            .expect_create_due_reminder()
            .withf(|record| record.recipient_id == "u2" && record.day == day())
            .times(1)
            .returning(|_| Ok(Some(NotificationId::new())));

        let dispatcher = NotificationDispatcher::new(Arc::new(store));
        let created = dispatcher
            .dispatch_due_date_reminders_on(day(), 1)
            .await
            .unwrap();

        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_reminders_lost_to_a_concurrent_check_are_not_counted() {
        let mut store = MockNotificationStore::new();
        store
            .expect_query_due_forms()
            .returning(|_| Ok(vec![form("f1", &["u1", "u2", "u3"], "u1")]));
        store
            .expect_has_due_reminder()
            .times(3)
            .returning(|_, _, _| Ok(false));
        store
            .expect_create_due_reminder()
            .times(3)
            .returning(|record| {
                if record.recipient_id == "u2" {
                    Ok(None)
                } else {
                    Ok(Some(NotificationId::new()))
                }
            });
        store.expect_create_notification().never();

        let dispatcher = NotificationDispatcher::new(Arc::new(store));
        let created = dispatcher
            .dispatch_due_date_reminders_on(day(), 1)
            .await
            .unwrap();

        assert_eq!(created, 2);
    }

    #[tokio::test]
    async fn test_reminders_propagate_query_failure() {
        let mut store = MockNotificationStore::new();
        store
            .expect_query_due_forms()
            .returning(|_| Err(PortalError::StoreUnavailable("offline".into())));
        store.expect_create_due_reminder().never();

        let dispatcher = NotificationDispatcher::new(Arc::new(store));
        let err = dispatcher
            .dispatch_due_date_reminders_on(day(), 1)
            .await
            .unwrap_err();

        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_welcome_failure_is_swallowed() {
        let mut store = MockNotificationStore::new();
        store
            .expect_create_notification()
            .withf(|record| record.kind == NotificationKind::Welcome && record.recipient_id == "u9")
            .times(1)
            .returning(|_| Err(PortalError::StoreUnavailable("offline".into())));

        let dispatcher = NotificationDispatcher::new(Arc::new(store));
        dispatcher.dispatch_welcome("u9", "u9@example.org").await;
    }

    #[test]
    fn test_reminder_titles() {
        assert_eq!(reminder_title("Survey", 1), "Due tomorrow: Survey");
        assert_eq!(reminder_title("Survey", 3), "Due in 3 days: Survey");
    }
}
