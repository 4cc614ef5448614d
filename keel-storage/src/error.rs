//! Storage error types

use thiserror::Error;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// PostgREST code for "the result contains 0 rows" on a single-object request
pub const NO_ROWS_CODE: &str = "PGRST116";

/// Failures reported by a [`crate::RowStore`] backend.
///
/// Backends map their native errors onto these variants so that callers can
/// tell an empty table ([`StorageError::NoRows`]) or a lost race
/// ([`StorageError::DuplicateKey`]) apart from a real fault.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Storage connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A single-row read found nothing
    #[error("No rows returned ({NO_ROWS_CODE})")]
    NoRows,

    #[error("Relation does not exist: {0}")]
    MissingRelation(String),

    /// Unique or primary key violation
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// A row or schema was rejected before reaching the backend
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Storage configuration error: {0}")]
    ConfigError(String),

    /// A row could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

impl StorageError {
    pub fn is_no_rows(&self) -> bool {
        matches!(self, StorageError::NoRows)
    }

    /// Stable code for log lines and reports
    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::NoRows => NO_ROWS_CODE,
            StorageError::ConnectionFailed(_) => "CONNECTION_ERROR",
            StorageError::QueryFailed(_) => "QUERY_ERROR",
            StorageError::MissingRelation(_) => "MISSING_RELATION",
            StorageError::DuplicateKey(_) => "DUPLICATE_KEY",
            StorageError::ValidationFailed(_) => "VALIDATION_ERROR",
            StorageError::ConfigError(_) => "CONFIG_ERROR",
            StorageError::SerializationError(_) => "SERIALIZATION_ERROR",
        }
    }
}
