//! Backfill command implementation.

use super::{init_tracing, load_config};
use crate::adapters::redis::RedisStore;
use crate::core::config::{Config, ConfigOverrides};
use crate::core::runtime::build_pipeline;
use crate::kits::{Backfill, BackfillReport};
use crate::pipeline::PipelineStats;
use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;
use std::sync::Arc;

/// Reconcile every existing record once.
#[derive(Args, Debug)]
pub struct BackfillArgs {
    /// Record key pattern (defaults to pipeline.record_pattern).
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Run the backfill command.
pub async fn run_backfill(args: BackfillArgs, config_path: &Path, overrides: &ConfigOverrides) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    init_tracing(&config.telemetry.log_level);

    let pattern = args
        .pattern
        .unwrap_or_else(|| config.pipeline.record_pattern.clone());
    let report = backfill_once(&config, &pattern).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Backfill of {}", pattern);
        println!("  Scanned:     {}", report.scanned);
        println!("  Reconciled:  {}", report.reconciled);
        println!("  Failed:      {}", report.failed);
    }

    if report.failed > 0 {
        anyhow::bail!("{} of {} records failed", report.failed, report.scanned);
    }
    Ok(())
}

/// Run one backfill against the configured Redis.
async fn backfill_once(config: &Config, pattern: &str) -> Result<BackfillReport> {
    let store = Arc::new(RedisStore::new(config.redis.clone()));
    let pipeline = Arc::new(build_pipeline(
        &config.pipeline,
        store.clone(),
        store.clone(),
        Arc::new(PipelineStats::new()),
    ));

    let backfill = Backfill::new(store, pipeline.clone(), config.pipeline.max_in_flight);
    let report = backfill
        .run(pattern)
        .await
        .with_context(|| format!("backfill scan of {} failed", pattern))?;
    pipeline.stats().snapshot().log("backfill pipeline stats");
    Ok(report)
}
