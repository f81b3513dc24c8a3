//! Storage layer for the portal
//!
//! Traits for the document-store operations the notification core needs,
//! and a libSQL implementation of all of them.

pub mod libsql;

use crate::error::Result;
use crate::types::{Form, NewNotification, Notification, NotificationId, UserProfile};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Notification store access
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Count unread notifications for a user
    async fn get_unread_count(&self, user_id: &str) -> Result<u64>;

    /// Persist a notification and return its id
    ///
    /// Fails with `Validation` when the recipient id is empty.
    async fn create_notification(&self, record: &NewNotification) -> Result<NotificationId>;

    /// Persist a due-date reminder unless one exists for (form, recipient, day)
    ///
    /// The check and the write are one atomic step, so concurrent checks
    /// cannot both insert. Returns `None` when the reminder was already there.
    async fn create_due_reminder(&self, record: &NewNotification)
        -> Result<Option<NotificationId>>;

    /// Forms whose due date is exactly `target_date`
    async fn query_due_forms(&self, target_date: NaiveDate) -> Result<Vec<Form>>;

    /// Whether a due-date reminder already exists for (form, recipient, day)
    async fn has_due_reminder(
        &self,
        form_id: &str,
        recipient_id: &str,
        day: NaiveDate,
    ) -> Result<bool>;

    /// Most recent notifications for a user, newest first
    async fn list_notifications(&self, user_id: &str, limit: usize)
        -> Result<Vec<Notification>>;

    /// Flag one notification as read
    async fn mark_read(&self, id: NotificationId) -> Result<()>;

    /// Flag every unread notification of a user as read, returning how many changed
    async fn mark_all_read(&self, user_id: &str) -> Result<u64>;
}

/// Form persistence
#[async_trait]
pub trait FormStore: Send + Sync {
    /// Store a new form
    async fn insert_form(&self, form: &Form) -> Result<()>;

    /// Retrieve a form by ID
    async fn get_form(&self, id: &str) -> Result<Form>;

    /// Forms created by, targeted at, or public to the user; newest first
    async fn list_visible_forms(&self, user_id: &str) -> Result<Vec<Form>>;
}

/// User directory persistence
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert or replace a user profile
    async fn upsert_user(&self, profile: &UserProfile) -> Result<()>;

    /// Retrieve a user by ID
    async fn get_user(&self, id: &str) -> Result<UserProfile>;

    /// Users whose display name starts with `prefix`, ordered by display name
    async fn search_users_by_prefix(&self, prefix: &str, limit: usize)
        -> Result<Vec<UserProfile>>;
}
