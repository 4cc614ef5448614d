//! Keel CLI main entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info, warn};

mod cli;
mod commands;

use cli::{Cli, Commands, ConfigCommands};
use keel_config::{ConfigLoader, KeelConfig};

/// Load configuration from the given file, or from the environment
fn load_config(config_path: Option<&PathBuf>) -> Result<KeelConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) => {
            if path.exists() {
                info!("Loading configuration from: {:?}", path);
                loader
                    .from_file(path)
                    .context(format!("Failed to load configuration from {:?}", path))
            } else {
                warn!("Configuration file not found: {:?}. Using defaults.", path);
                loader
                    .from_env()
                    .context("Failed to load configuration from environment")
            }
        }
        None => {
            debug!("No configuration file specified. Loading from environment or defaults.");
            loader
                .from_env()
                .context("Failed to load configuration from environment")
        }
    }
}

fn init_logging(config: &KeelConfig, log_level: Option<&String>) -> Result<()> {
    match log_level {
        Some(level) => keel_logging::init_simple_tracing(level),
        None => keel_logging::init_logging_from_config(&config.logging),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config subcommands work without a loadable configuration
    if let Some(Commands::Config { config_cmd }) = &cli.command {
        keel_logging::init_simple_tracing(cli.log_level.as_deref().unwrap_or("warn"))?;
        return match config_cmd {
            ConfigCommands::Validate { config_file } => commands::config::validate(config_file),
            ConfigCommands::Generate { output, force } => commands::config::generate(output, *force),
        };
    }

    let config = load_config(cli.config.as_ref())?;
    init_logging(&config, cli.log_level.as_ref())?;

    match &cli.command {
        Some(Commands::Migrate {
            instance_id,
            manifest,
            app_version,
            format,
        }) => {
            let options = commands::migrate::MigrateOptions {
                instance_id: instance_id.clone(),
                manifest: manifest.clone(),
                app_version: app_version.clone(),
                format: *format,
            };
            commands::migrate::run(&config, options).await
        }
        Some(Commands::Status { manifest, format }) => {
            commands::status::run(&config, manifest.clone(), *format).await
        }
        Some(Commands::Config { .. }) => Ok(()),
        None => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            cmd.print_help().context("Failed to print help")?;
            println!();
            Ok(())
        }
    }
}
