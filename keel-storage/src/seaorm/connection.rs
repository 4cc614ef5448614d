use keel_config::DatabaseConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Open a connection pool for the configured database
pub async fn connect(config: &DatabaseConfig) -> StorageResult<DatabaseConnection> {
    info!("Connecting to database: {}", redact(&config.url));

    ensure_sqlite_directory(&config.url)?;

    let in_memory = config.url.contains(":memory:");
    let mut opts = ConnectOptions::new(config.url.clone());
    opts.connect_timeout(config.connection_timeout)
        .acquire_timeout(config.connection_timeout)
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    if in_memory {
        // Every SQLite connection to :memory: is its own database
        opts.max_connections(1).min_connections(1);
    } else {
        opts.max_connections(config.max_connections)
            .min_connections(1)
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(3600));
    }

    let connection = Database::connect(opts)
        .await
        .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

    debug!(
        "Database connection established with {} max connections",
        if in_memory { 1 } else { config.max_connections }
    );

    Ok(connection)
}

/// Create the parent directory of a file-based SQLite database
fn ensure_sqlite_directory(database_url: &str) -> StorageResult<()> {
    if !database_url.starts_with("sqlite:") || database_url.contains(":memory:") {
        return Ok(());
    }

    let file_path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .ok_or_else(|| StorageError::ConfigError(format!("Invalid SQLite URL format: {}", database_url)))?;
    let file_path = file_path.split('?').next().unwrap_or(file_path);

    if let Some(parent_dir) = std::path::Path::new(file_path).parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            info!("Creating database directory: {:?}", parent_dir);
            std::fs::create_dir_all(parent_dir).map_err(|e| {
                StorageError::ConfigError(format!(
                    "Failed to create database directory {:?}: {}",
                    parent_dir, e
                ))
            })?;
        }
    }
    Ok(())
}

/// Hide the password part of a connection URL
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let credentials = &url[scheme_end + 3..at];
            match credentials.find(':') {
                Some(colon) => format!(
                    "{}{}:***{}",
                    &url[..scheme_end + 3],
                    &credentials[..colon],
                    &url[at..]
                ),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}
