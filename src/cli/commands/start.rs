//! Start command implementation.

use super::{init_tracing, load_config};
use crate::core::config::ConfigOverrides;
use crate::core::runtime::Runtime;
use anyhow::Result;
use clap::Args;
use std::path::Path;

/// Watch record changes and keep kit summaries current.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Backfill existing records once the keyspace subscription is live.
    #[arg(long)]
    pub backfill: bool,
}

/// Run the start command.
pub async fn run_start(args: StartArgs, config_path: &Path, overrides: &ConfigOverrides) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    init_tracing(&config.telemetry.log_level);

    let runtime = Runtime::new(config)?.with_backfill(args.backfill);
    runtime.run().await
}
