//! Core data types for the portal notification core
//!
//! Sessions mirrored from the identity provider, notifications written by
//! dispatch, and the forms and user profiles that trigger them.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Unique identifier for notifications
///
/// Wraps a UUID so notification IDs cannot be mixed up with the
/// provider-issued user and form identifiers, which are plain strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub Uuid);

impl NotificationId {
    /// Create a new random notification ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a notification ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider-side account metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

/// Signed-in user as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl Session {
    /// Minimal session with only an id and email
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            display_name: None,
            photo_url: None,
            metadata: SessionMetadata::default(),
        }
    }

    /// Name to show in the UI: display name, falling back to the email
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }
}

/// What caused a notification to be written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A form was shared with the recipient
    NewForm,
    /// A form targeted at the recipient is due soon
    DueDate,
    /// Sent once on registration
    Welcome,
}

impl NotificationKind {
    /// Stable name used in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewForm => "new_form",
            NotificationKind::DueDate => "due_date",
            NotificationKind::Welcome => "welcome",
        }
    }

    /// Parse the storage name back into a kind
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new_form" => Some(NotificationKind::NewForm),
            "due_date" => Some(NotificationKind::DueDate),
            "welcome" => Some(NotificationKind::Welcome),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event details carried by a notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default)]
    pub form_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub actor_name: Option<String>,
}

/// Insert shape for a notification; the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub payload: NotificationPayload,
    /// Local calendar day the notification belongs to (due-date dedup key)
    pub day: NaiveDate,
}

impl NewNotification {
    /// Notification for today's local date
    pub fn new(
        recipient_id: impl Into<String>,
        kind: NotificationKind,
        payload: NotificationPayload,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            kind,
            payload,
            day: Local::now().date_naive(),
        }
    }

    /// Pin the notification to a specific day
    pub fn on_day(mut self, day: NaiveDate) -> Self {
        self.day = day;
        self
    }
}

/// A persisted notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub payload: NotificationPayload,
    pub created_at: DateTime<Utc>,
    pub day: NaiveDate,
    pub read: bool,
}

/// A form as shared through the portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Recipient user ids, kept in first-seen order without duplicates
    #[serde(default)]
    pub target_users: Vec<String>,
    #[serde(default)]
    pub is_public: bool,
    pub created_by: String,
    #[serde(default)]
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Form {
    /// Name of the creator for notification text
    pub fn actor_name(&self) -> &str {
        self.created_by_name.as_deref().unwrap_or(&self.created_by)
    }
}

/// Input for creating a form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewForm {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub target_users: Vec<String>,
    #[serde(default)]
    pub is_public: bool,
    pub created_by: String,
    #[serde(default)]
    pub created_by_name: Option<String>,
}

/// Directory entry for a registered user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Deduplicate ids keeping first-seen order, dropping blanks
pub fn dedup_ids<'a, I>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut seen = HashSet::new();
    ids.into_iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}
