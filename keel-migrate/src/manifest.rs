//! YAML migration manifest
//!
//! ```yaml
//! migrations:
//!   - version: 1
//!     name: create_notes
//!     app_version: "1.0.0"
//!     statements:
//!       - CREATE TABLE IF NOT EXISTS notes (id BIGSERIAL PRIMARY KEY, body TEXT NOT NULL)
//!   - version: 2
//!     app_version: "1.1.0"
//!     procedure: provision_attachments_bucket
//! compatibility:
//!   - app_version: "1.0.0"
//!     db_version: 1
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::compatibility::{parse_app_version, CompatibilityMap};
use crate::error::{MigrationError, MigrationResult};
use crate::registry::{MigrationBody, MigrationDefinition, MigrationRegistry, Procedure};

/// Procedures a host makes available to manifest entries, by name
pub type ProcedureCatalog = HashMap<String, Arc<dyn Procedure>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMigration {
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub app_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestCompatibility {
    pub app_version: String,
    pub db_version: i64,
}

/// Declarative migration list plus an optional compatibility map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationManifest {
    #[serde(default)]
    pub migrations: Vec<ManifestMigration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<Vec<ManifestCompatibility>>,
}

impl MigrationManifest {
    pub fn from_yaml(content: &str) -> MigrationResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| MigrationError::configuration(format!("invalid migration manifest: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> MigrationResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrationError::configuration(format!(
                "cannot read migration manifest {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Build the registry for manifests without procedures
    pub fn registry(&self) -> MigrationResult<MigrationRegistry> {
        self.registry_with(&ProcedureCatalog::new())
    }

    /// Build the registry, resolving procedure names through `catalog`
    pub fn registry_with(&self, catalog: &ProcedureCatalog) -> MigrationResult<MigrationRegistry> {
        let mut definitions = Vec::with_capacity(self.migrations.len());
        for entry in &self.migrations {
            let app_version = parse_app_version(&entry.app_version)?;
            let procedure = match &entry.procedure {
                Some(name) => Some(catalog.get(name).cloned().ok_or_else(|| {
                    MigrationError::configuration(format!(
                        "migration {} names unknown procedure '{}'",
                        entry.version, name
                    ))
                })?),
                None => None,
            };

            let body = match (entry.statements.is_empty(), procedure) {
                (false, None) => MigrationBody::Declarative(entry.statements.clone()),
                (true, Some(procedure)) => MigrationBody::Procedural(procedure),
                (false, Some(procedure)) => MigrationBody::Combined {
                    statements: entry.statements.clone(),
                    procedure,
                },
                (true, None) => {
                    return Err(MigrationError::configuration(format!(
                        "migration {} has neither statements nor a procedure",
                        entry.version
                    )))
                }
            };

            let mut definition = MigrationDefinition::new(entry.version, app_version, body);
            if let Some(name) = &entry.name {
                definition = definition.with_name(name.clone());
            }
            definitions.push(definition);
        }
        MigrationRegistry::new(definitions)
    }

    /// Explicit compatibility map, if the manifest declares one
    pub fn compatibility_map(&self) -> MigrationResult<Option<CompatibilityMap>> {
        self.compatibility
            .as_ref()
            .map(|entries| {
                CompatibilityMap::parse(
                    entries
                        .iter()
                        .map(|e| (e.app_version.as_str(), e.db_version)),
                )
            })
            .transpose()
    }
}
