//! Domain-driven configuration management for Keel
//!
//! Configuration is split by functional domain (logging, HTTP, storage backend,
//! migration), with validation, defaults, and environment variable support.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    backend::{BackendConfig, BackendKind, DatabaseConfig, RestConfig},
    http::HttpConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    migration::MigrationConfig,
    KeelConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration;
