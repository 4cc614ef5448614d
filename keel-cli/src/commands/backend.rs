//! Storage backend selection

use anyhow::{Context, Result};
use keel_config::{BackendKind, KeelConfig};
use keel_http::{RestClient, RestClientConfig};
use keel_storage::seaorm::SeaOrmStore;
use keel_storage::{RowStore, SqlEndpoint};
use std::sync::Arc;
use tracing::info;

/// Row storage and SQL execution over one configured backend
pub struct Backend {
    pub store: Arc<dyn RowStore>,
    pub endpoint: Arc<dyn SqlEndpoint>,
}

impl Backend {
    pub async fn from_config(config: &KeelConfig) -> Result<Self> {
        match config.backend.kind {
            BackendKind::Rest => {
                let client_config = RestClientConfig::from_config(&config.backend.rest, &config.http)
                    .context("Invalid REST backend configuration")?;
                info!("Using REST backend at {}", client_config.base_url);
                let client = Arc::new(RestClient::new(client_config).context("Failed to create REST client")?);
                Ok(Self {
                    store: client.clone(),
                    endpoint: client,
                })
            }
            BackendKind::Database => {
                let store = Arc::new(
                    SeaOrmStore::connect(&config.backend.database)
                        .await
                        .context("Failed to connect to database")?,
                );
                info!("Using direct database backend ({:?})", store.dialect());
                Ok(Self {
                    store: store.clone(),
                    endpoint: store,
                })
            }
        }
    }
}
