//! HTTP settings for the REST backend

use crate::error::ConfigResult;
use crate::validation::{require, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client settings applied to every gateway request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bounds a single remote call. The migration flow has no overall timeout
    /// beyond its retry budgets.
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub timeout: Duration,

    pub user_agent: String,

    /// Turn off only for self-signed development gateways
    pub verify_ssl: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("keel/", env!("CARGO_PKG_VERSION")).to_string(),
            verify_ssl: true,
        }
    }
}

impl Validatable for HttpConfig {
    fn validate(&self) -> ConfigResult<()> {
        require(self, !self.timeout.is_zero(), "timeout must be greater than 0")?;
        require(self, !self.user_agent.trim().is_empty(), "user_agent cannot be empty")
    }

    fn domain_name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_crate_version() {
        let config = HttpConfig::default();
        assert!(config.user_agent.starts_with("keel/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_and_blank_agent_rejected() {
        let zero = HttpConfig {
            timeout: Duration::ZERO,
            ..HttpConfig::default()
        };
        assert!(zero.validate().unwrap_err().to_string().contains("timeout"));

        let blank = HttpConfig {
            user_agent: " ".to_string(),
            ..HttpConfig::default()
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_timeout_accepts_human_durations() {
        let config: HttpConfig = serde_yaml::from_str("timeout: 1m 30s\nverify_ssl: false\n").unwrap();
        assert_eq!(config.timeout, Duration::from_secs(90));
        assert!(!config.verify_ssl);
    }
}
