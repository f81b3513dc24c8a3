//! User directory
//!
//! Registration (which sends the welcome notification) and display-name
//! prefix search for user pickers.

use crate::dispatch::NotificationDispatcher;
use crate::error::{PortalError, Result};
use crate::storage::UserStore;
use crate::types::UserProfile;
use std::sync::Arc;
use tracing::{debug, info};

pub struct UserDirectory {
    store: Arc<dyn UserStore>,
    dispatcher: NotificationDispatcher,
    max_results: usize,
}

impl UserDirectory {
    pub fn new(
        store: Arc<dyn UserStore>,
        dispatcher: NotificationDispatcher,
        max_results: usize,
    ) -> Self {
        Self {
            store,
            dispatcher,
            max_results: max_results.max(1),
        }
    }

    /// Store a newly registered user and greet them
    ///
    /// The welcome notification never affects the outcome of registration.
    pub async fn register(&self, profile: UserProfile) -> Result<UserProfile> {
        if profile.id.trim().is_empty() {
            return Err(PortalError::Validation("user id is required".to_string()));
        }
        if profile.email.trim().is_empty() {
            return Err(PortalError::Validation("user email is required".to_string()));
        }

        let profile = UserProfile {
            display_name: if profile.display_name.trim().is_empty() {
                profile.email.clone()
            } else {
                profile.display_name.trim().to_string()
            },
            ..profile
        };

        self.store.upsert_user(&profile).await?;
        info!("Registered user {}", profile.id);

        self.dispatcher
            .dispatch_welcome(&profile.id, &profile.email)
            .await;

        Ok(profile)
    }

    /// Users whose display name starts with `prefix`
    ///
    /// Blank prefixes return nothing without touching the store.
    pub async fn search(&self, prefix: &str, limit: usize) -> Result<Vec<UserProfile>> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }

        let limit = limit.clamp(1, self.max_results);
        debug!("Searching users by prefix '{}' (limit {})", prefix, limit);
        self.store.search_users_by_prefix(prefix, limit).await
    }

    /// Retrieve a user by ID
    pub async fn get(&self, user_id: &str) -> Result<UserProfile> {
        self.store.get_user(user_id).await
    }
}
