//! CLI argument parsing definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bring the schema up to what the application version needs
    Migrate {
        /// Identifier recorded as the lock owner (default: <hostname>-<uuid>)
        #[arg(long, value_name = "ID")]
        instance_id: Option<String>,

        /// Migration manifest; overrides `migration.manifest`
        #[arg(long, value_name = "PATH")]
        manifest: Option<PathBuf>,

        /// Running application version; overrides `migration.app_version`
        #[arg(long, value_name = "VERSION")]
        app_version: Option<String>,

        /// Output format for the run report
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show the applied versions, the lock row and what the manifest still has pending
    Status {
        /// Migration manifest to compare against; overrides `migration.manifest`
        #[arg(long, value_name = "PATH")]
        manifest: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Write a sample configuration file
    Generate {
        /// Output file path
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_arguments() {
        let cli = Cli::try_parse_from([
            "keel",
            "--config",
            "keel.yaml",
            "migrate",
            "--instance-id",
            "web-1",
            "--app-version",
            "1.2.0",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("keel.yaml")));
        match cli.command {
            Some(Commands::Migrate {
                instance_id,
                manifest,
                app_version,
                format,
            }) => {
                assert_eq!(instance_id.as_deref(), Some("web-1"));
                assert!(manifest.is_none());
                assert_eq!(app_version.as_deref(), Some("1.2.0"));
                assert_eq!(format, OutputFormat::Text);
            }
            _ => panic!("expected migrate"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["keel", "status", "--format", "json", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(
            cli.command,
            Some(Commands::Status {
                manifest: None,
                format: OutputFormat::Json
            })
        ));
    }

    #[test]
    fn test_config_generate_requires_output() {
        assert!(Cli::try_parse_from(["keel", "config", "generate"]).is_err());
    }
}
