//! LibSQL storage backend implementation
//!
//! Keeps notifications, forms and the user directory in one libSQL database.
//! Every backend failure surfaces as `PortalError::StoreUnavailable`.

use crate::error::{PortalError, Result};
use crate::storage::{FormStore, NotificationStore, UserStore};
use crate::types::{
    Form, NewNotification, Notification, NotificationId, NotificationKind, NotificationPayload,
    UserProfile,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{params, Builder, Connection, Database};
use std::path::PathBuf;
use tracing::{debug, info};

/// Schema statements, applied in order on every open
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id TEXT PRIMARY KEY NOT NULL,
        recipient_id TEXT NOT NULL,
        kind TEXT NOT NULL CHECK(kind IN ('new_form', 'due_date', 'welcome')),
        form_id TEXT,
        title TEXT NOT NULL,
        message TEXT NOT NULL DEFAULT '',
        actor_id TEXT,
        actor_name TEXT,
        created_at TEXT NOT NULL,
        created_day TEXT NOT NULL,
        is_read INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_notifications_unread ON notifications(recipient_id, is_read)",
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_notifications_due_reminder
        ON notifications(form_id, recipient_id, created_day)
        WHERE kind = 'due_date'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS forms (
        id TEXT PRIMARY KEY NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        due_date TEXT,
        target_users TEXT NOT NULL DEFAULT '[]',
        is_public INTEGER NOT NULL DEFAULT 0,
        created_by TEXT NOT NULL,
        created_by_name TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_forms_due_date ON forms(due_date)",
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY NOT NULL,
        email TEXT NOT NULL,
        display_name TEXT NOT NULL,
        photo_url TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_users_display_name ON users(display_name)",
];

const NOTIFICATION_COLUMNS: &str = "id, recipient_id, kind, form_id, title, message, actor_id, actor_name, created_at, created_day, is_read";

const FORM_COLUMNS: &str = "id, title, description, due_date, target_users, is_public, created_by, created_by_name, created_at";

const USER_COLUMNS: &str = "id, email, display_name, photo_url, created_at";

/// Database connection mode
#[derive(Debug, Clone)]
pub enum ConnectionMode {
    /// Local file-based database
    Local(PathBuf),
    /// In-memory database (for testing)
    InMemory,
}

/// LibSQL storage backend
///
/// Holds a single connection so in-memory databases keep their schema.
pub struct LibsqlStore {
    _db: Database,
    conn: Connection,
}

impl LibsqlStore {
    /// Open (creating if needed) a database and apply the schema
    pub async fn open(mode: ConnectionMode) -> Result<Self> {
        let db = match mode {
            ConnectionMode::Local(ref path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            PortalError::StoreUnavailable(format!(
                                "Failed to create database directory {}: {}",
                                parent.display(),
                                e
                            ))
                        })?;
                    }
                }

                Builder::new_local(path).build().await.map_err(|e| {
                    PortalError::StoreUnavailable(format!("Failed to open local database: {}", e))
                })?
            }
            ConnectionMode::InMemory => Builder::new_local(":memory:")
                .build()
                .await
                .map_err(|e| {
                    PortalError::StoreUnavailable(format!(
                        "Failed to create in-memory database: {}",
                        e
                    ))
                })?,
        };

        let conn = db.connect()?;
        let store = Self { _db: db, conn };
        store.apply_schema().await?;

        info!("LibSQL store ready ({:?})", mode);
        Ok(store)
    }

    async fn apply_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            self.conn.execute(statement, params![]).await?;
        }
        debug!("Applied {} schema statements", SCHEMA.len());
        Ok(())
    }

    async fn insert_notification(
        &self,
        id: &NotificationId,
        record: &NewNotification,
        on_conflict: &str,
    ) -> Result<u64> {
        if record.recipient_id.trim().is_empty() {
            return Err(PortalError::Validation(
                "notification is missing a recipient id".to_string(),
            ));
        }

        let sql = format!(
            "INSERT INTO notifications ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0){}",
            NOTIFICATION_COLUMNS, on_conflict
        );

        let affected = self
            .conn
            .execute(
                &sql,
                params![
                    id.to_string(),
                    record.recipient_id.clone(),
                    record.kind.as_str(),
                    record.payload.form_id.clone(),
                    record.payload.title.clone(),
                    record.payload.message.clone(),
                    record.payload.actor_id.clone(),
                    record.payload.actor_name.clone(),
                    Utc::now().to_rfc3339(),
                    record.day.to_string()
                ],
            )
            .await?;

        Ok(affected)
    }

    fn row_to_notification(row: &libsql::Row) -> Result<Notification> {
        let id_str: String = row.get(0)?;
        let id = NotificationId::from_string(&id_str)
            .map_err(|e| PortalError::Other(format!("Invalid notification id {}: {}", id_str, e)))?;

        let kind_str: String = row.get(2)?;
        let kind = NotificationKind::parse(&kind_str)
            .ok_or_else(|| PortalError::Other(format!("Unknown notification kind: {}", kind_str)))?;

        let created_at: String = row.get(8)?;
        let created_day: String = row.get(9)?;
        let is_read: i64 = row.get(10)?;

        Ok(Notification {
            id,
            recipient_id: row.get(1)?,
            kind,
            payload: NotificationPayload {
                form_id: row.get(3)?,
                title: row.get(4)?,
                message: row.get(5)?,
                actor_id: row.get(6)?,
                actor_name: row.get(7)?,
            },
            created_at: parse_timestamp(&created_at)?,
            day: parse_day(&created_day)?,
            read: is_read != 0,
        })
    }

    fn row_to_form(row: &libsql::Row) -> Result<Form> {
        let due_date: Option<String> = row.get(3)?;
        let targets_json: String = row.get(4)?;
        let is_public: i64 = row.get(5)?;
        let created_at: String = row.get(8)?;

        Ok(Form {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            due_date: due_date.as_deref().map(parse_day).transpose()?,
            target_users: serde_json::from_str(&targets_json)?,
            is_public: is_public != 0,
            created_by: row.get(6)?,
            created_by_name: row.get(7)?,
            created_at: parse_timestamp(&created_at)?,
        })
    }

    fn row_to_user(row: &libsql::Row) -> Result<UserProfile> {
        let created_at: String = row.get(4)?;

        Ok(UserProfile {
            id: row.get(0)?,
            email: row.get(1)?,
            display_name: row.get(2)?,
            photo_url: row.get(3)?,
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PortalError::Other(format!("Invalid timestamp {}: {}", s, e)))
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    s.parse::<NaiveDate>()
        .map_err(|e| PortalError::Other(format!("Invalid date {}: {}", s, e)))
}

#[async_trait]
impl NotificationStore for LibsqlStore {
    async fn get_unread_count(&self, user_id: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0",
                params![user_id],
            )
            .await?;

        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };

        Ok(count.max(0) as u64)
    }

    async fn create_notification(&self, record: &NewNotification) -> Result<NotificationId> {
        let id = NotificationId::new();
        self.insert_notification(&id, record, "").await?;

        debug!(
            "Created {} notification {} for {}",
            record.kind, id, record.recipient_id
        );
        Ok(id)
    }

    async fn create_due_reminder(
        &self,
        record: &NewNotification,
    ) -> Result<Option<NotificationId>> {
        if record.kind != NotificationKind::DueDate {
            return Err(PortalError::Validation(format!(
                "{} notification is not a due-date reminder",
                record.kind
            )));
        }
        if record.payload.form_id.as_deref().map_or(true, |f| f.trim().is_empty()) {
            return Err(PortalError::Validation(
                "due-date reminder is missing a form id".to_string(),
            ));
        }

        let id = NotificationId::new();
        let affected = self
            .insert_notification(&id, record, " ON CONFLICT DO NOTHING")
            .await?;

        if affected == 0 {
            debug!(
                "Reminder for {} on form {:?} already exists for {}",
                record.recipient_id, record.payload.form_id, record.day
            );
            return Ok(None);
        }
        Ok(Some(id))
    }

    async fn query_due_forms(&self, target_date: NaiveDate) -> Result<Vec<Form>> {
        let sql = format!("SELECT {} FROM forms WHERE due_date = ?", FORM_COLUMNS);
        let mut rows = self
            .conn
            .query(&sql, params![target_date.to_string()])
            .await?;

        let mut forms = Vec::new();
        while let Some(row) = rows.next().await? {
            forms.push(Self::row_to_form(&row)?);
        }

        debug!("Found {} forms due on {}", forms.len(), target_date);
        Ok(forms)
    }

    async fn has_due_reminder(
        &self,
        form_id: &str,
        recipient_id: &str,
        day: NaiveDate,
    ) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM notifications WHERE kind = 'due_date' AND form_id = ? AND recipient_id = ? AND created_day = ? LIMIT 1",
                params![form_id, recipient_id, day.to_string()],
            )
            .await?;

        Ok(rows.next().await?.is_some())
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE recipient_id = ? ORDER BY created_at DESC LIMIT ?",
            NOTIFICATION_COLUMNS
        );
        let mut rows = self.conn.query(&sql, params![user_id, limit as i64]).await?;

        let mut notifications = Vec::new();
        while let Some(row) = rows.next().await? {
            notifications.push(Self::row_to_notification(&row)?);
        }

        Ok(notifications)
    }

    async fn mark_read(&self, id: NotificationId) -> Result<()> {
        let affected = self
            .conn
            .execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?",
                params![id.to_string()],
            )
            .await?;

        if affected == 0 {
            return Err(PortalError::NotFound(format!("notification {}", id)));
        }
        Ok(())
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let affected = self
            .conn
            .execute(
                "UPDATE notifications SET is_read = 1 WHERE recipient_id = ? AND is_read = 0",
                params![user_id],
            )
            .await?;

        Ok(affected)
    }
}

#[async_trait]
impl FormStore for LibsqlStore {
    async fn insert_form(&self, form: &Form) -> Result<()> {
        let targets_json = serde_json::to_string(&form.target_users)?;
        let sql = format!(
            "INSERT INTO forms ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            FORM_COLUMNS
        );

        self.conn
            .execute(
                &sql,
                params![
                    form.id.clone(),
                    form.title.clone(),
                    form.description.clone(),
                    form.due_date.map(|d| d.to_string()),
                    targets_json,
                    form.is_public as i64,
                    form.created_by.clone(),
                    form.created_by_name.clone(),
                    form.created_at.to_rfc3339()
                ],
            )
            .await?;

        debug!("Stored form {} ({})", form.id, form.title);
        Ok(())
    }

    async fn get_form(&self, id: &str) -> Result<Form> {
        let sql = format!("SELECT {} FROM forms WHERE id = ?", FORM_COLUMNS);
        let mut rows = self.conn.query(&sql, params![id]).await?;

        match rows.next().await? {
            Some(row) => Self::row_to_form(&row),
            None => Err(PortalError::NotFound(format!("form {}", id))),
        }
    }

    async fn list_visible_forms(&self, user_id: &str) -> Result<Vec<Form>> {
        let sql = format!(
            r#"
            SELECT {} FROM forms
            WHERE created_by = ?1
               OR is_public = 1
               OR EXISTS (SELECT 1 FROM json_each(forms.target_users) WHERE json_each.value = ?1)
            ORDER BY created_at DESC
            "#,
            FORM_COLUMNS
        );
        let mut rows = self.conn.query(&sql, params![user_id]).await?;

        let mut forms = Vec::new();
        while let Some(row) = rows.next().await? {
            forms.push(Self::row_to_form(&row)?);
        }

        Ok(forms)
    }
}

#[async_trait]
impl UserStore for LibsqlStore {
    async fn upsert_user(&self, profile: &UserProfile) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO users ({}) VALUES (?, ?, ?, ?, ?)",
            USER_COLUMNS
        );

        self.conn
            .execute(
                &sql,
                params![
                    profile.id.clone(),
                    profile.email.clone(),
                    profile.display_name.clone(),
                    profile.photo_url.clone(),
                    profile.created_at.to_rfc3339()
                ],
            )
            .await?;

        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<UserProfile> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let mut rows = self.conn.query(&sql, params![id]).await?;

        match rows.next().await? {
            Some(row) => Self::row_to_user(&row),
            None => Err(PortalError::NotFound(format!("user {}", id))),
        }
    }

    async fn search_users_by_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<UserProfile>> {
        // Range scan on the index, then an exact character prefix match
        let sql = format!(
            "SELECT {} FROM users WHERE display_name >= ?1 AND substr(display_name, 1, length(?1)) = ?1 ORDER BY display_name LIMIT ?2",
            USER_COLUMNS
        );
        let mut rows = self
            .conn
            .query(&sql, params![prefix, limit as i64])
            .await?;

        let mut users = Vec::new();
        while let Some(row) = rows.next().await? {
            users.push(Self::row_to_user(&row)?);
        }

        debug!("Prefix search '{}' matched {} users", prefix, users.len());
        Ok(users)
    }
}
