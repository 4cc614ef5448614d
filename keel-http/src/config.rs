//! REST client configuration

use keel_config::{HttpConfig as ConfigHttpConfig, RestConfig};
use std::time::Duration;

use crate::errors::HttpError;

/// Settings for [`crate::RestClient`]
#[derive(Debug, Clone)]
pub struct RestClientConfig {
    /// Project base URL without the `/rest/v1` suffix
    pub base_url: url::Url,

    /// Service key, sent as `apikey` and as bearer token
    pub api_key: String,

    /// Schema profile, if not the gateway default
    pub schema: Option<String>,

    /// SQL execution RPC function name
    pub rpc_function: String,

    /// Request timeout
    pub timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Whether to verify SSL certificates
    pub verify_ssl: bool,
}

impl RestClientConfig {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, HttpError> {
        let defaults = ConfigHttpConfig::default();
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            api_key: api_key.into(),
            schema: None,
            rpc_function: "exec_sql".to_string(),
            timeout: defaults.timeout,
            user_agent: defaults.user_agent,
            verify_ssl: defaults.verify_ssl,
        })
    }

    /// Combine the backend and HTTP domains of the configuration
    pub fn from_config(rest: &RestConfig, http: &ConfigHttpConfig) -> Result<Self, HttpError> {
        Ok(Self {
            base_url: parse_base_url(&rest.url)?,
            api_key: rest.api_key.clone(),
            schema: rest.schema.clone(),
            rpc_function: rest.rpc_function.clone(),
            timeout: http.timeout,
            user_agent: http.user_agent.clone(),
            verify_ssl: http.verify_ssl,
        })
    }
}

fn parse_base_url(raw: &str) -> Result<url::Url, HttpError> {
    let trimmed = raw.trim_end_matches('/');
    let parsed = url::Url::parse(trimmed).map_err(|e| HttpError::InvalidUrl(format!("{}: {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(HttpError::InvalidUrl(format!(
            "unsupported scheme '{}' in {}",
            other, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let rest = RestConfig {
            url: "https://project.example.co/".to_string(),
            api_key: "service-key".to_string(),
            schema: Some("app".to_string()),
            rpc_function: "run_sql".to_string(),
        };
        let config = RestClientConfig::from_config(&rest, &ConfigHttpConfig::default()).unwrap();
        assert_eq!(config.base_url.as_str(), "https://project.example.co/");
        assert_eq!(config.rpc_function, "run_sql");
        assert_eq!(config.schema.as_deref(), Some("app"));
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_rejects_bad_urls() {
        assert!(RestClientConfig::new("ftp://example.com", "k").is_err());
        assert!(RestClientConfig::new("not a url", "k").is_err());
    }
}
