//! Portal configuration
//!
//! Loaded from TOML with per-section defaults. Durations are written as
//! whole seconds. `PORTAL_DB_PATH` overrides the configured database path.

use crate::error::{PortalError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `storage.db_path`
pub const DB_PATH_ENV: &str = "PORTAL_DB_PATH";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub badge: BadgeConfig,

    #[serde(default)]
    pub directory: DirectoryConfig,
}

/// Document store location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the libSQL database file
    pub db_path: PathBuf,
}

/// Due-date reminder scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Start the scheduler automatically when serving
    pub enabled: bool,

    /// Time between reminder checks (in seconds)
    #[serde(with = "serde_duration")]
    pub check_interval: Duration,

    /// Delay before the automatic start (in seconds)
    #[serde(with = "serde_duration")]
    pub startup_delay: Duration,

    /// Remind about forms due this many days ahead
    pub reminder_days: u32,
}

/// Unread badge poller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BadgeConfig {
    /// Time between unread count refreshes (in seconds)
    #[serde(with = "serde_duration")]
    pub poll_interval: Duration,
}

/// User directory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Upper bound on prefix search results
    pub max_search_results: usize,
}

// Custom serde module for Duration (serialize/deserialize as seconds)
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Default database path under the platform data directory
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("portal")
        .join("portal.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: Duration::from_secs(3600), // 1 hour
            startup_delay: Duration::from_secs(5),
            reminder_days: 1,
        }
    }
}

impl Default for BadgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            max_search_results: 10,
        }
    }
}

impl PortalConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: PortalConfig = toml::from_str(toml_str)
            .map_err(|e| PortalError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            if !path.trim().is_empty() {
                self.storage.db_path = PathBuf::from(path);
            }
        }
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.check_interval.is_zero() {
            return Err(PortalError::Config(
                "scheduler: check_interval must be greater than zero".to_string(),
            ));
        }

        if self.scheduler.reminder_days == 0 {
            return Err(PortalError::Config(
                "scheduler: reminder_days must be at least 1".to_string(),
            ));
        }

        if self.badge.poll_interval.is_zero() {
            return Err(PortalError::Config(
                "badge: poll_interval must be greater than zero".to_string(),
            ));
        }

        if self.directory.max_search_results == 0 {
            return Err(PortalError::Config(
                "directory: max_search_results must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| PortalError::Config(e.to_string()))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}
