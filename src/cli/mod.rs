//! Command-line interface.
//!
//! Unified CLI for kitmax operations.

pub mod commands;

use crate::core::config::ConfigOverrides;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/kitmax.toml";

/// kitmax - keeps per-kit maxima of tile records up to date in Redis.
#[derive(Parser, Debug)]
#[command(name = "kitmax")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Override the Redis host.
    #[arg(long, global = true)]
    pub redis_host: Option<String>,

    /// Override the Redis port.
    #[arg(long, global = true)]
    pub redis_port: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Resolved configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Overrides collected from global flags.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log_level: self.log_level.clone(),
            redis_host: self.redis_host.clone(),
            redis_port: self.redis_port,
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch record changes and keep kit summaries current.
    Start(commands::StartArgs),
    /// Reconcile every existing record once.
    Backfill(commands::BackfillArgs),
    /// Kit operations.
    Kits(commands::KitsArgs),
    /// Check that Redis is reachable.
    Health(commands::HealthArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
}
