//! Portal - notification core for the organizational portal
//!
//! Provides the service layer behind the portal's sidebar badge, form
//! sharing and user directory:
//! - Auth state broadcasting from the identity provider
//! - Notification storage and unread counts
//! - Notification dispatch for new forms, due dates and welcomes
//! - A due-date reminder scheduler and an unread badge poller
//!
//! # Architecture
//!
//! Services are constructed explicitly and shared by `Arc`:
//! - **Storage**: `NotificationStore`, `FormStore`, `UserStore` (libSQL backed)
//! - **Dispatch**: `NotificationDispatcher`, built over a notification store
//! - **Scheduler**: `ReminderScheduler`, driving dispatch on a timer
//! - **Badge**: `BadgePoller`, driven by `AuthBroadcaster` session changes
//!
//! # Example
//!
//! ```ignore
//! use portal_core::{ConnectionMode, LibsqlStore, NotificationDispatcher, PortalConfig, ReminderScheduler};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PortalConfig::default();
//!     let store = Arc::new(LibsqlStore::open(ConnectionMode::Local(config.storage.db_path.clone())).await?);
//!     let dispatcher = NotificationDispatcher::new(store.clone());
//!
//!     let scheduler = ReminderScheduler::new(dispatcher, config.scheduler.clone());
//!     scheduler.auto_start();
//!
//!     tokio::signal::ctrl_c().await?;
//!     scheduler.shutdown();
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod badge;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod forms;
pub mod scheduler;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use auth::{AuthBroadcaster, IdentityProvider, Subscription};
pub use badge::{badge_label, BadgePoller, BadgeSurface};
pub use config::PortalConfig;
pub use directory::UserDirectory;
pub use dispatch::NotificationDispatcher;
pub use error::{PortalError, Result};
pub use forms::FormService;
pub use scheduler::{CheckReport, ReminderScheduler, SchedulerStatus};
pub use storage::libsql::{ConnectionMode, LibsqlStore};
pub use storage::{FormStore, NotificationStore, UserStore};
pub use types::{
    Form, NewForm, NewNotification, Notification, NotificationId, NotificationKind,
    NotificationPayload, Session, SessionMetadata, UserProfile,
};
