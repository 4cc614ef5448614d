//! Startup helper for host applications

use keel_config::MigrationConfig;
use keel_storage::{RowStore, SqlEndpoint};
use std::sync::Arc;
use tracing::{error, info};

use crate::compatibility::{parse_app_version, CompatibilityMap};
use crate::error::MigrationResult;
use crate::orchestrator::{MigrationReport, Orchestrator};
use crate::registry::MigrationRegistry;

/// `<hostname>-<uuid>`, or `keel-<uuid>` when the hostname is unavailable
pub fn default_instance_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "keel".to_string());
    format!("{}-{}", host, uuid::Uuid::new_v4())
}

/// Run migrations during host startup, before any traffic is accepted.
///
/// The running application version comes from `config.app_version`, falling
/// back to `fallback_app_version` (typically the host's
/// `env!("CARGO_PKG_VERSION")`). Without an explicit compatibility map each
/// migration's own application version is used. An error means the host must
/// not start.
pub async fn startup_migrations(
    store: Arc<dyn RowStore>,
    endpoint: Arc<dyn SqlEndpoint>,
    registry: Arc<MigrationRegistry>,
    compatibility: Option<CompatibilityMap>,
    config: &MigrationConfig,
    fallback_app_version: &str,
) -> MigrationResult<MigrationReport> {
    let instance_id = default_instance_id();

    let mut builder = Orchestrator::builder(store, endpoint, registry)
        .app_version(parse_app_version(fallback_app_version)?)
        .config(config)?;
    if let Some(map) = compatibility {
        builder = builder.compatibility(map);
    }
    let orchestrator = builder.build()?;

    match orchestrator.run_migrations(&instance_id).await {
        Ok(report) => {
            if report.applied.is_empty() {
                info!("No pending migrations to apply");
            } else {
                info!("Applied {} migration(s) on startup", report.applied.len());
            }
            Ok(report)
        }
        Err(err) => {
            error!(code = err.error_code(), error = %err, "Startup migrations failed");
            Err(err)
        }
    }
}
