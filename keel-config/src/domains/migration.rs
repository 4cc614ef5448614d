//! Migration orchestration configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, validate_semver, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Migration orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Key of the row in `migration_locks` guarding the migration critical section
    #[serde(default = "default_lock_key")]
    pub lock_key: String,

    /// Number of polls after a failed first lock attempt
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,

    /// Fixed interval between lock polls
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_one_second"
    )]
    pub lock_retry_interval: Duration,

    /// Total attempts per SQL statement (first call included)
    #[serde(default = "default_sql_max_attempts")]
    pub sql_max_attempts: u32,

    /// Fixed delay between SQL attempts
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_one_second"
    )]
    pub sql_retry_delay: Duration,

    /// Running application version; hosts fall back to their package version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    /// Path to the YAML migration manifest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            lock_key: default_lock_key(),
            lock_retries: default_lock_retries(),
            lock_retry_interval: default_one_second(),
            sql_max_attempts: default_sql_max_attempts(),
            sql_retry_delay: default_one_second(),
            app_version: None,
            manifest: None,
        }
    }
}

impl Validatable for MigrationConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.lock_key, "lock_key", self.domain_name())?;
        validate_positive(self.sql_max_attempts, "sql_max_attempts", self.domain_name())?;

        if let Some(version) = &self.app_version {
            validate_semver(version, "app_version", self.domain_name())?;
        }

        if let Some(manifest) = &self.manifest {
            if manifest.as_os_str().is_empty() {
                return Err(self.validation_error("manifest path cannot be empty"));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "migration"
    }
}

fn default_lock_key() -> String {
    "schema_migration".to_string()
}

fn default_lock_retries() -> u32 {
    10
}

fn default_sql_max_attempts() -> u32 {
    3
}

fn default_one_second() -> Duration {
    Duration::from_secs(1)
}
