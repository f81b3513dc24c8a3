//! Error types for the portal notification core
//!
//! Structured errors via thiserror. Only `StoreUnavailable` is transient:
//! callers retry it on the next scheduled tick, never inline.

use thiserror::Error;

/// Main error type for portal operations
#[derive(Error, Debug)]
pub enum PortalError {
    /// Backend store call failed
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Malformed input to a dispatch or create call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced user, form or notification is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl PortalError {
    /// Whether the next scheduled attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, PortalError::StoreUnavailable(_))
    }
}

/// Result type alias for portal operations
pub type Result<T> = std::result::Result<T, PortalError>;

impl From<libsql::Error> for PortalError {
    fn from(err: libsql::Error) -> Self {
        PortalError::StoreUnavailable(err.to_string())
    }
}

/// Convert anyhow::Error to PortalError
impl From<anyhow::Error> for PortalError {
    fn from(err: anyhow::Error) -> Self {
        PortalError::Other(err.to_string())
    }
}
