//! Form creation and listing
//!
//! Creating a form notifies its target users. Notification delivery is
//! best effort: a dispatch failure is logged and the form is still created.

use crate::dispatch::NotificationDispatcher;
use crate::error::{PortalError, Result};
use crate::storage::FormStore;
use crate::types::{dedup_ids, Form, NewForm};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Creates forms and lists the ones a user can see
pub struct FormService {
    store: Arc<dyn FormStore>,
    dispatcher: NotificationDispatcher,
}

impl FormService {
    pub fn new(store: Arc<dyn FormStore>, dispatcher: NotificationDispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Persist a new form and notify its targets
    pub async fn create_form(&self, input: NewForm) -> Result<Form> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(PortalError::Validation("form title is required".to_string()));
        }
        if input.created_by.trim().is_empty() {
            return Err(PortalError::Validation("form creator is required".to_string()));
        }

        let form = Form {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: input.description,
            due_date: input.due_date,
            target_users: dedup_ids(&input.target_users),
            is_public: input.is_public,
            created_by: input.created_by.trim().to_string(),
            created_by_name: input.created_by_name,
            created_at: Utc::now(),
        };

        self.store.insert_form(&form).await?;
        info!(
            "Form {} created by {} for {} users",
            form.id,
            form.created_by,
            form.target_users.len()
        );

        if let Err(e) = self.dispatcher.dispatch_new_form(&form).await {
            warn!("Notifications for form {} not sent: {}", form.id, e);
        }

        Ok(form)
    }

    /// Forms the user created, was targeted by, or that are public
    pub async fn list_forms(&self, user_id: &str) -> Result<Vec<Form>> {
        self.store.list_visible_forms(user_id).await
    }

    /// Retrieve a form by ID
    pub async fn get_form(&self, id: &str) -> Result<Form> {
        self.store.get_form(id).await
    }
}
