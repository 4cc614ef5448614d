//! Configuration loading with `KEEL_*` environment overrides
//!
//! | variable              | field                          |
//! |-----------------------|--------------------------------|
//! | `KEEL_LOG_LEVEL`      | `logging.level`                |
//! | `KEEL_LOG_FORMAT`     | `logging.format`               |
//! | `KEEL_HTTP_TIMEOUT`   | `http.timeout` (seconds)       |
//! | `KEEL_BACKEND`        | `backend.kind`                 |
//! | `KEEL_REST_URL`       | `backend.rest.url`             |
//! | `KEEL_REST_API_KEY`   | `backend.rest.api_key`         |
//! | `KEEL_DATABASE_URL`   | `backend.database.url`         |
//! | `KEEL_APP_VERSION`    | `migration.app_version`        |
//! | `KEEL_LOCK_KEY`       | `migration.lock_key`           |
//! | `KEEL_LOCK_RETRIES`   | `migration.lock_retries`       |
//! | `KEEL_MANIFEST`       | `migration.manifest`           |

use crate::domains::KeelConfig;
use crate::error::{ConfigError, ConfigResult};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Loads [`KeelConfig`] from YAML and/or the environment, then validates it
pub struct ConfigLoader {
    prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::with_prefix("KEEL")
    }

    /// Use `<prefix>_*` instead of `KEEL_*`
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<KeelConfig> {
        let content = std::fs::read_to_string(path)?;
        self.finish(serde_yaml::from_str(&content)?)
    }

    /// Defaults plus environment overrides
    pub fn from_env(&self) -> ConfigResult<KeelConfig> {
        self.finish(KeelConfig::default())
    }

    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<KeelConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    fn finish(&self, mut config: KeelConfig) -> ConfigResult<KeelConfig> {
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    fn apply_env_overrides(&self, config: &mut KeelConfig) -> ConfigResult<()> {
        self.parse_into("LOG_LEVEL", &mut config.logging.level)?;
        self.parse_into("LOG_FORMAT", &mut config.logging.format)?;
        if let Some(seconds) = self.parsed::<u64>("HTTP_TIMEOUT")? {
            config.http.timeout = Duration::from_secs(seconds);
        }

        self.parse_into("BACKEND", &mut config.backend.kind)?;
        self.parse_into("REST_URL", &mut config.backend.rest.url)?;
        self.parse_into("REST_API_KEY", &mut config.backend.rest.api_key)?;
        self.parse_into("DATABASE_URL", &mut config.backend.database.url)?;

        let migration = &mut config.migration;
        if let Some(version) = self.var("APP_VERSION") {
            migration.app_version = Some(version);
        }
        self.parse_into("LOCK_KEY", &mut migration.lock_key)?;
        self.parse_into("LOCK_RETRIES", &mut migration.lock_retries)?;
        if let Some(manifest) = self.var("MANIFEST") {
            migration.manifest = Some(PathBuf::from(manifest));
        }
        Ok(())
    }

    /// Overwrite `slot` when the variable is set
    fn parse_into<T>(&self, name: &str, slot: &mut T) -> ConfigResult<()>
    where
        T: FromStr,
        T::Err: Display,
    {
        if let Some(value) = self.parsed(name)? {
            *slot = value;
        }
        Ok(())
    }

    fn parsed<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.var(name)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| {
                    ConfigError::EnvError(format!("Invalid {}_{}: {}", self.prefix, name, e))
                })
            })
            .transpose()
    }

    fn var(&self, name: &str) -> Option<String> {
        std::env::var(format!("{}_{}", self.prefix, name)).ok()
    }
}
