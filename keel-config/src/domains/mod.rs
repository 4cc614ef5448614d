//! Domain-specific configuration modules

pub mod backend;
pub mod http;
pub mod logging;
pub mod migration;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Keel configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KeelConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,

    /// HTTP client configuration
    #[serde(default)]
    pub http: http::HttpConfig,

    /// Storage backend configuration
    #[serde(default)]
    pub backend: backend::BackendConfig,

    /// Migration orchestration configuration
    #[serde(default)]
    pub migration: migration::MigrationConfig,
}

impl KeelConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.logging.validate()?;
        self.http.validate()?;
        self.backend.validate()?;
        self.migration.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file with placeholder REST credentials
    pub fn generate_sample() -> String {
        let mut config = KeelConfig::default();
        config.backend.rest.url = "https://project.example.co".to_string();
        config.backend.rest.api_key = "service-role-key".to_string();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
