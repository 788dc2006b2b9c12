//! Domain errors for the agent cache.

use thiserror::Error;

/// Domain-level errors that can occur in the cache and sync engine.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid global id '{id}': {reason}")]
    InvalidGlobalId { id: String, reason: String },

    #[error("Unknown chain prefix: {0}")]
    UnknownChainPrefix(String),

    #[error("Invalid agent record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },

    #[error("Data source '{0}' is unavailable")]
    SourceUnavailable(String),

    #[error("Upstream error from '{source_name}': {message}")]
    Upstream { source_name: String, message: String },

    #[error("Data source already registered: {0}")]
    DuplicateSource(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DomainError {
    /// Build an upstream failure for the named source.
    pub fn upstream(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Whether this error originates from the local store rather than an upstream.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Serialization(_))
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
