//! Configuration error types

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration file: {0}")]
    FileReadError(#[from] std::io::Error),

    #[error("Cannot parse configuration YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A `KEEL_*` override could not be parsed
    #[error("Environment override rejected: {0}")]
    EnvError(String),

    /// A domain failed validation, e.g. `backend.rest: url cannot be empty`
    #[error("Invalid configuration in {domain}: {message}")]
    DomainError { domain: String, message: String },
}
