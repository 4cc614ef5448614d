//! Migration error types

use keel_storage::StorageError;
use thiserror::Error;

/// Result type for migration operations
pub type MigrationResult<T> = std::result::Result<T, MigrationError>;

/// Errors surfaced by the migration subsystem.
///
/// Every variant that reaches [`crate::Orchestrator::run_migrations`] is fatal
/// for the host: it must not start serving traffic.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Registry, compatibility map or running version is inconsistent
    #[error("Migration configuration error: {0}")]
    Configuration(String),

    /// The exclusive lock was not obtained within the retry budget
    #[error("Could not acquire migration lock '{lock_key}' after {attempts} attempts")]
    LockAcquisition { lock_key: String, attempts: u32 },

    /// Transport failures exhausted the SQL retry budget
    #[error("SQL execution failed after {attempts} attempts: {last_error}")]
    TransientExecution {
        attempts: u32,
        last_error: String,
        body: Option<String>,
    },

    /// The endpoint executed the SQL and reported a failure
    #[error("SQL execution reported an error: {message}")]
    ApplicationSql {
        message: String,
        body: Option<String>,
    },

    /// The endpoint answered without an explicit success flag
    #[error("SQL endpoint response carried no success flag")]
    MissingSuccessFlag { body: Option<String> },

    /// A post-creation probe against a ledger table failed
    #[error("Schema verification failed for table '{table}': {cause}")]
    Verification { table: String, cause: StorageError },

    /// A procedural migration step failed
    #[error("Migration {version} procedure failed: {message}")]
    Procedure { version: i64, message: String },

    /// Storage error outside schema verification
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl MigrationError {
    pub fn configuration(message: impl Into<String>) -> Self {
        MigrationError::Configuration(message.into())
    }

    pub fn procedure(version: i64, message: impl Into<String>) -> Self {
        MigrationError::Procedure {
            version,
            message: message.into(),
        }
    }

    /// Raw endpoint response body, when the failure carried one
    pub fn body(&self) -> Option<&str> {
        match self {
            MigrationError::TransientExecution { body, .. }
            | MigrationError::ApplicationSql { body, .. }
            | MigrationError::MissingSuccessFlag { body } => body.as_deref(),
            _ => None,
        }
    }

    /// Short code for log lines and reports
    pub fn error_code(&self) -> &'static str {
        match self {
            MigrationError::Configuration(_) => "CONFIGURATION",
            MigrationError::LockAcquisition { .. } => "LOCK_ACQUISITION",
            MigrationError::TransientExecution { .. } => "TRANSIENT_EXECUTION",
            MigrationError::ApplicationSql { .. } => "APPLICATION_SQL",
            MigrationError::MissingSuccessFlag { .. } => "MISSING_SUCCESS_FLAG",
            MigrationError::Verification { .. } => "VERIFICATION",
            MigrationError::Procedure { .. } => "PROCEDURE",
            MigrationError::Storage(_) => "STORAGE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_is_exposed_for_sql_failures() {
        let err = MigrationError::TransientExecution {
            attempts: 3,
            last_error: "connection reset".to_string(),
            body: Some("upstream down".to_string()),
        };
        assert_eq!(err.body(), Some("upstream down"));
        assert!(err.to_string().contains("connection reset"));
        assert!(err.to_string().contains("3 attempts"));
        assert_eq!(MigrationError::configuration("x").body(), None);
    }

    #[test]
    fn test_error_codes() {
        let err = MigrationError::Verification {
            table: "migrations".to_string(),
            cause: StorageError::QueryFailed("permission denied".to_string()),
        };
        assert_eq!(err.error_code(), "VERIFICATION");
        assert!(err.to_string().contains("permission denied"));
    }
}
