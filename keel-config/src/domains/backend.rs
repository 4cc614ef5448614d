//! Storage backend configuration
//!
//! Keel reaches the shared database either through a PostgREST-style REST
//! gateway (rows over `/rest/v1`, SQL through an RPC function) or through a
//! direct database connection.

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, validate_url, Validatable};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Which backend carries storage and SQL execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Rest,
    Database,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rest" => Ok(BackendKind::Rest),
            "database" | "db" => Ok(BackendKind::Database),
            _ => Err(format!("Invalid backend kind: {}", s)),
        }
    }
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BackendConfig {
    /// Selected backend
    pub kind: BackendKind,

    /// REST gateway settings, used when `kind` is `rest`
    pub rest: RestConfig,

    /// Direct database settings, used when `kind` is `database`
    pub database: DatabaseConfig,
}

/// REST gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    /// Project base URL, e.g. `https://project.example.co`
    pub url: String,

    /// Service key sent as `apikey` and bearer token. Needs DDL privileges.
    pub api_key: String,

    /// Optional schema profile (`Accept-Profile` / `Content-Profile`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Name of the SQL execution RPC function
    #[serde(default = "default_rpc_function")]
    pub rpc_function: String,
}

/// Direct database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database URL (`postgres://...` or `sqlite:...`)
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Connection timeout
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub connection_timeout: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            schema: None,
            rpc_function: default_rpc_function(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 10,
            connection_timeout: Duration::from_secs(30),
        }
    }
}

impl Validatable for BackendConfig {
    fn validate(&self) -> ConfigResult<()> {
        match self.kind {
            BackendKind::Rest => self.rest.validate(),
            BackendKind::Database => self.database.validate(),
        }
    }

    fn domain_name(&self) -> &'static str {
        "backend"
    }
}

impl Validatable for RestConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_url(&self.url, "url", self.domain_name())?;
        validate_required_string(&self.api_key, "api_key", self.domain_name())?;
        validate_required_string(&self.rpc_function, "rpc_function", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "backend.rest"
    }
}

impl Validatable for DatabaseConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.url, "url", self.domain_name())?;
        if !(self.url.starts_with("sqlite:")
            || self.url.starts_with("postgres://")
            || self.url.starts_with("postgresql://"))
        {
            return Err(self.validation_error(format!(
                "url must be a sqlite or postgres URL, got '{}'",
                self.url
            )));
        }
        validate_positive(self.max_connections, "max_connections", self.domain_name())?;
        validate_positive(
            self.connection_timeout.as_secs(),
            "connection_timeout",
            self.domain_name(),
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "backend.database"
    }
}

fn default_rpc_function() -> String {
    "exec_sql".to_string()
}
