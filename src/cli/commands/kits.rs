//! Kits command implementation.

use super::{init_tracing, load_config};
use crate::adapters::redis::RedisStore;
use crate::core::config::ConfigOverrides;
use crate::kits::{KitRegistry, KitSummary};
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::Path;
use std::sync::Arc;

/// Kit operations.
#[derive(Args, Debug)]
pub struct KitsArgs {
    #[command(subcommand)]
    pub command: KitsCommand,
}

/// Kits subcommands.
#[derive(Subcommand, Debug)]
pub enum KitsCommand {
    /// List every kit with its maxima.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show one kit.
    Show {
        /// Kit name.
        name: String,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Register a new kit.
    Create {
        /// Kit name.
        name: String,
    },
}

/// Run the kits command.
pub async fn run_kits(args: KitsArgs, config_path: &Path, overrides: &ConfigOverrides) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    init_tracing(&config.telemetry.log_level);
    let registry = KitRegistry::new(Arc::new(RedisStore::new(config.redis.clone())));

    match args.command {
        KitsCommand::List { json } => {
            let kits = registry.list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&kits)?);
            } else {
                print_table(&kits);
            }
        }
        KitsCommand::Show { name, json } => {
            let kit = registry.get(&name).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&kit)?);
            } else {
                print_table(std::slice::from_ref(&kit));
            }
        }
        KitsCommand::Create { name } => {
            let kit = registry.create(&name).await?;
            println!("✓ Created kit {}", kit.name);
        }
    }
    Ok(())
}

fn print_table(kits: &[KitSummary]) {
    if kits.is_empty() {
        println!("No kits found");
        return;
    }

    let width = kits
        .iter()
        .map(|kit| kit.name.len())
        .max()
        .unwrap_or(0)
        .max("KIT".len());
    println!("{:<width$}  {:>12}  {:>16}", "KIT", "MAX STATE", "MAX UPDATED AT");
    for kit in kits {
        println!(
            "{:<width$}  {:>12}  {:>16}",
            kit.name, kit.max_state, kit.max_updated_at
        );
    }
}
