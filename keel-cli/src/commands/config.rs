//! `keel config validate|generate`

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use keel_config::{ConfigLoader, KeelConfig};
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub fn validate(config_file: &Path) -> Result<()> {
    info!("Validating configuration file: {:?}", config_file);

    if !config_file.exists() {
        return Err(anyhow!("Configuration file not found: {:?}", config_file));
    }

    match ConfigLoader::new().from_file(config_file) {
        Ok(_) => {
            println!("{} Configuration file is valid", "✓".green());
            Ok(())
        }
        Err(e) => {
            println!("{} Configuration validation failed: {}", "✗".red(), e);
            error!("Configuration validation failed: {}", e);
            Err(e.into())
        }
    }
}

pub fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }

    fs::write(output, KeelConfig::generate_sample())
        .with_context(|| format!("Failed to write {:?}", output))?;
    println!("{} Sample configuration written to {:?}", "✓".green(), output);
    Ok(())
}
