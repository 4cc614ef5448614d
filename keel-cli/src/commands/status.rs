//! `keel status`

use anyhow::{Context, Result};
use colored::Colorize;
use keel_config::KeelConfig;
use keel_migrate::{
    CompatibilityMap, LedgerEntry, MigrationManifest, MigrationRegistry, PollingLock,
    VersionLedger,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use super::backend::Backend;
use crate::cli::OutputFormat;

/// Registered migrations and compatibility rules as seen from the database
struct ManifestView {
    registry: MigrationRegistry,
    compatibility: CompatibilityMap,
}

impl ManifestView {
    fn load(path: &Path) -> Result<Self> {
        let manifest = MigrationManifest::from_file(path)?;
        let registry = manifest.registry()?;
        let compatibility = manifest
            .compatibility_map()?
            .unwrap_or_else(|| CompatibilityMap::from_registry(&registry));
        Ok(Self {
            registry,
            compatibility,
        })
    }

    fn name_of(&self, version: i64) -> Option<&str> {
        self.registry.get(version).map(|m| m.name.as_str())
    }

    fn to_json(&self, current: i64) -> Value {
        let pending: Vec<Value> = self
            .registry
            .pending(current)
            .iter()
            .map(|m| {
                json!({
                    "version": m.version,
                    "name": m.name,
                    "app_version": m.required_app_version.to_string(),
                })
            })
            .collect();
        json!({
            "registered": self.registry.len(),
            "latest_version": self.registry.latest_version(),
            "pending": pending,
            "compatibility": self.compatibility.entries(),
        })
    }

    fn print(&self, current: i64) {
        if self.registry.is_empty() {
            println!("{} manifest registers no migrations", "Manifest:".bold());
        } else {
            let pending = self.registry.pending(current);
            println!(
                "{} {} registered, {} pending",
                "Manifest:".bold(),
                self.registry.len(),
                pending.len().to_string().yellow()
            );
            for migration in pending {
                println!(
                    "  {:>5}  {}  from app {}",
                    migration.version, migration.name, migration.required_app_version
                );
            }
        }

        if self.compatibility.is_empty() {
            println!("{} none", "Compatibility:".bold());
            return;
        }
        println!("{}", "Compatibility:".bold());
        for entry in self.compatibility.entries() {
            println!("  app {} needs schema {}", entry.app_version, entry.db_version);
        }
    }
}

pub async fn run(
    config: &KeelConfig,
    manifest: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let view = manifest
        .or_else(|| config.migration.manifest.clone())
        .map(|path| ManifestView::load(&path))
        .transpose()?;

    let backend = Backend::from_config(config).await?;
    let ledger = VersionLedger::new(backend.store.clone());
    ledger.ensure_schema().await?;

    let applied = ledger.applied().await?;
    let history = ledger.compatibility_history().await?;
    let current = applied.last().map(|entry| entry.version).unwrap_or(0);
    let lock = PollingLock::new(backend.store)
        .inspect(&config.migration.lock_key)
        .await?;

    if format == OutputFormat::Json {
        let status = json!({
            "current_version": current,
            "applied": applied,
            "compatibility_history": history,
            "lock": lock,
            "manifest": view.as_ref().map(|v| v.to_json(current)),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&status).context("Failed to format status as JSON")?
        );
        return Ok(());
    }

    println!("{} {}", "Schema version:".bold(), current.to_string().green());
    if applied.is_empty() {
        println!("  no migrations applied");
    }
    for entry in &applied {
        print_applied(entry, &history, view.as_ref());
    }

    print!("{} ", "Lock:".bold());
    match lock {
        Some(record) if record.locked => println!(
            "{} by {} since {}",
            "held".red(),
            record.locked_by.as_deref().unwrap_or("unknown"),
            record
                .locked_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "-".to_string())
        ),
        Some(_) => println!("{}", "free".green()),
        None => println!("{}", "never taken".dimmed()),
    }

    if let Some(view) = &view {
        view.print(current);
    }
    Ok(())
}

fn print_applied(
    entry: &LedgerEntry,
    history: &[keel_migrate::CompatibilityRecord],
    view: Option<&ManifestView>,
) {
    let app_version = history
        .iter()
        .find(|record| record.db_version == entry.version)
        .map(|record| record.app_version.as_str())
        .unwrap_or("-");
    let name = view.and_then(|v| v.name_of(entry.version)).unwrap_or("");
    println!(
        "  {:>5}  {}  app {}  {}",
        entry.version,
        entry.applied_at.to_rfc3339(),
        app_version,
        name
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
migrations:
  - version: 1
    name: create_notes
    app_version: "1.0.0"
    statements:
      - CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)
  - version: 2
    name: add_pinned
    app_version: "1.1.0"
    statements:
      - ALTER TABLE notes ADD COLUMN pinned BOOLEAN
"#;

    fn view_from(content: &str) -> ManifestView {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrations.yaml");
        std::fs::write(&path, content).unwrap();
        ManifestView::load(&path).unwrap()
    }

    #[test]
    fn test_manifest_view_lists_pending_after_current() {
        let view = view_from(MANIFEST);
        assert_eq!(view.name_of(1), Some("create_notes"));
        assert_eq!(view.name_of(3), None);

        let json = view.to_json(1);
        assert_eq!(json["registered"], 2);
        assert_eq!(json["latest_version"], 2);
        assert_eq!(json["pending"].as_array().unwrap().len(), 1);
        assert_eq!(json["pending"][0]["name"], "add_pinned");
        assert_eq!(json["pending"][0]["app_version"], "1.1.0");
        // Derived from the registry when the manifest declares no map
        assert_eq!(json["compatibility"].as_array().unwrap().len(), 2);
        assert_eq!(json["compatibility"][1]["db_version"], 2);

        assert!(view.to_json(2)["pending"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_manifest_view_prefers_declared_map() {
        let content = format!(
            "{}compatibility:\n  - app_version: \"2.0.0\"\n    db_version: 2\n",
            MANIFEST
        );
        let view = view_from(&content);
        let entries = view.compatibility.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].app_version.to_string(), "2.0.0");
    }

    #[tokio::test]
    async fn test_status_against_sqlite_with_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("migrations.yaml");
        std::fs::write(&manifest, MANIFEST).unwrap();

        let mut config = KeelConfig::default();
        config.backend.kind = keel_config::BackendKind::Database;

        run(&config, Some(manifest), OutputFormat::Json).await.unwrap();
    }
}
