//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use portal_core::{
    ConnectionMode, Form, LibsqlStore, NewNotification, Notification, NotificationId,
    NotificationStore, PortalError, Result,
};
use std::sync::Arc;
use tempfile::TempDir;

/// Create a LibSQL store in a temporary directory
///
/// The TempDir must outlive the store.
pub async fn create_test_store() -> (Arc<LibsqlStore>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("portal-test.db");

    let store = LibsqlStore::open(ConnectionMode::Local(db_path))
        .await
        .expect("Failed to create test store");

    (Arc::new(store), temp_dir)
}

/// Build a form row directly, bypassing FormService
pub fn test_form(id: &str, targets: &[&str], created_by: &str, due: Option<NaiveDate>) -> Form {
    Form {
        id: id.to_string(),
        title: format!("Form {}", id),
        description: String::new(),
        due_date: due,
        target_users: targets.iter().map(|s| s.to_string()).collect(),
        is_public: false,
        created_by: created_by.to_string(),
        created_by_name: None,
        created_at: Utc::now(),
    }
}

/// Notification store whose every call fails
pub struct UnavailableStore;

fn offline<T>() -> Result<T> {
    Err(PortalError::StoreUnavailable("store offline".to_string()))
}

#[async_trait]
impl NotificationStore for UnavailableStore {
    async fn get_unread_count(&self, _user_id: &str) -> Result<u64> {
        offline()
    }

    async fn create_notification(&self, _record: &NewNotification) -> Result<NotificationId> {
        offline()
    }

    async fn create_due_reminder(&self, _record: &NewNotification) -> Result<Option<NotificationId>> {
        offline()
    }

    async fn query_due_forms(&self, _target_date: NaiveDate) -> Result<Vec<Form>> {
        offline()
    }

    async fn has_due_reminder(&self, _: &str, _: &str, _: NaiveDate) -> Result<bool> {
        offline()
    }

    async fn list_notifications(&self, _: &str, _: usize) -> Result<Vec<Notification>> {
        offline()
    }

    async fn mark_read(&self, _id: NotificationId) -> Result<()> {
        offline()
    }

    async fn mark_all_read(&self, _user_id: &str) -> Result<u64> {
        offline()
    }
}
