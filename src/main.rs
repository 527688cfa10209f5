//! kitmax - unified CLI entrypoint.
//!
//! Usage:
//!   kitmax start --config config/kitmax.toml
//!   kitmax backfill [--pattern 'tile:*']
//!   kitmax kits list [--json]
//!   kitmax kits show <name>
//!   kitmax kits create <name>
//!   kitmax health
//!   kitmax config validate | show

use anyhow::Result;
use clap::Parser;
use kitmax::cli::commands::{run_backfill, run_config, run_health, run_kits, run_start};
use kitmax::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config_path();
    let overrides = cli.overrides();

    match cli.command {
        Commands::Start(args) => run_start(args, &config_path, &overrides).await,
        Commands::Backfill(args) => run_backfill(args, &config_path, &overrides).await,
        Commands::Kits(args) => run_kits(args, &config_path, &overrides).await,
        Commands::Health(args) => run_health(args, &config_path, &overrides).await,
        Commands::Config(args) => run_config(args, &config_path, &overrides),
    }
}
