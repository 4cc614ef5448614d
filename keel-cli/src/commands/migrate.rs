//! `keel migrate`

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use keel_config::KeelConfig;
use keel_migrate::{
    default_instance_id, parse_app_version, MigrationManifest, MigrationReport, Orchestrator,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use super::backend::Backend;
use crate::cli::OutputFormat;

pub struct MigrateOptions {
    pub instance_id: Option<String>,
    pub manifest: Option<PathBuf>,
    pub app_version: Option<String>,
    pub format: OutputFormat,
}

/// Resolve the manifest path and application version, flags first
fn resolve(config: &KeelConfig, options: &MigrateOptions) -> Result<(PathBuf, String)> {
    let manifest = options
        .manifest
        .clone()
        .or_else(|| config.migration.manifest.clone())
        .ok_or_else(|| anyhow!("No migration manifest given. Use --manifest or set migration.manifest"))?;
    let app_version = options
        .app_version
        .clone()
        .or_else(|| config.migration.app_version.clone())
        .ok_or_else(|| {
            anyhow!("No application version given. Use --app-version or set migration.app_version")
        })?;
    Ok((manifest, app_version))
}

pub async fn run(config: &KeelConfig, options: MigrateOptions) -> Result<()> {
    let (manifest_path, app_version) = resolve(config, &options)?;
    let manifest = MigrationManifest::from_file(&manifest_path)?;
    let registry = Arc::new(manifest.registry()?);
    info!(
        "Loaded {} migration(s) from {:?}",
        registry.len(),
        manifest_path
    );

    let backend = Backend::from_config(config).await?;
    let mut builder = Orchestrator::builder(backend.store, backend.endpoint, registry)
        .config(&config.migration)?
        .app_version(parse_app_version(&app_version)?);
    if let Some(map) = manifest.compatibility_map()? {
        builder = builder.compatibility(map);
    }
    let orchestrator = builder.build()?;

    let instance_id = options.instance_id.unwrap_or_else(default_instance_id);
    match orchestrator.run_migrations(&instance_id).await {
        Ok(report) => print_report(&report, options.format),
        Err(err) => {
            error!(code = err.error_code(), "Migration run failed: {}", err);
            if let Some(body) = err.body() {
                eprintln!("{} {}", "Response body:".dimmed(), body);
            }
            Err(err).context(format!("Migration failed for instance {}", instance_id))
        }
    }
}

fn print_report(report: &MigrationReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(report).context("Failed to format report as JSON")?
            );
        }
        OutputFormat::Text => {
            if report.applied.is_empty() {
                println!(
                    "{} schema at version {} (required {})",
                    "✓".green(),
                    report.final_version,
                    report.required_version
                );
            } else {
                let applied: Vec<String> = report.applied.iter().map(|v| v.to_string()).collect();
                println!(
                    "{} applied {} migration(s): {}",
                    "✓".green(),
                    report.applied.len(),
                    applied.join(", ")
                );
                println!(
                    "  schema version {} -> {}",
                    report.starting_version.to_string().yellow(),
                    report.final_version.to_string().green()
                );
            }
        }
    }
    Ok(())
}
