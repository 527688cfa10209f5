//! Config command implementation.

use super::load_config;
use crate::core::config::{Config, ConfigOverrides};
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::Path;

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate configuration file.
    Validate,
    /// Print the effective configuration with defaults and overrides applied.
    Show {
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
}

/// Run the config command.
pub fn run_config(args: ConfigArgs, config_path: &Path, overrides: &ConfigOverrides) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    match args.command {
        ConfigCommand::Validate => {
            println!("✓ Configuration {:?} is valid", config_path);
            if config.redis.notify_keyspace_events.is_none() {
                println!("  ⚠ Warning: redis.notify_keyspace_events not set; the server must already publish keyspace events");
            }
            Ok(())
        }
        ConfigCommand::Show { format } => {
            println!("{}", render(&redacted(config), &format)?);
            Ok(())
        }
    }
}

fn redacted(mut config: Config) -> Config {
    if config.redis.password.is_some() {
        config.redis.password = Some("********".to_string());
    }
    config
}

fn render(config: &Config, format: &str) -> Result<String> {
    match format {
        "json" => Ok(serde_json::to_string_pretty(config)?),
        "toml" => Ok(toml::to_string_pretty(config)?),
        other => anyhow::bail!("unknown format {:?} (expected toml or json)", other),
    }
}
