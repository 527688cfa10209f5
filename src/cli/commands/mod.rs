//! CLI command implementations.

mod backfill;
mod config;
mod health;
mod kits;
mod start;

pub use backfill::{run_backfill, BackfillArgs};
pub use config::{run_config, ConfigArgs, ConfigCommand};
pub use health::{run_health, HealthArgs};
pub use kits::{run_kits, KitsArgs, KitsCommand};
pub use start::{run_start, StartArgs};

use crate::core::config::{Config, ConfigOverrides};
use anyhow::{Context, Result};
use std::path::Path;

/// Load the configuration file and apply CLI overrides.
pub fn load_config(path: &Path, overrides: &ConfigOverrides) -> Result<Config> {
    let mut config = Config::from_file(path)
        .with_context(|| format!("failed to load config from {:?}", path))?;
    config.apply_overrides(overrides);
    config
        .validate()
        .context("invalid configuration after applying overrides")?;
    Ok(config)
}

/// Initialize tracing subscriber if the telemetry feature is enabled.
///
/// `RUST_LOG` takes precedence over the configured level.
#[cfg(feature = "telemetry")]
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[cfg(not(feature = "telemetry"))]
pub fn init_tracing(_level: &str) {}
