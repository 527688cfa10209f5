//! Health command implementation.

use super::load_config;
use crate::adapters::redis::RedisStore;
use crate::core::config::ConfigOverrides;
use crate::store::SummaryStore;
use anyhow::Result;
use clap::Args;
use std::path::Path;
use std::time::Instant;

/// Check that Redis is reachable.
#[derive(Args, Debug)]
pub struct HealthArgs {}

/// Run the health command.
///
/// The PING is bounded by the connect timeout.
pub async fn run_health(_args: HealthArgs, config_path: &Path, overrides: &ConfigOverrides) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    let address = config.redis.address();
    let timeout = config.redis.connect_timeout();
    let store = RedisStore::new(config.redis);

    let started = Instant::now();
    match tokio::time::timeout(timeout, store.ping()).await {
        Ok(Ok(())) => {
            println!(
                "✓ redis at {} is healthy ({}ms)",
                address,
                started.elapsed().as_millis()
            );
            Ok(())
        }
        Ok(Err(e)) => anyhow::bail!("redis at {} is unhealthy: {}", address, e),
        Err(_) => anyhow::bail!(
            "redis at {} did not answer PING within {}ms",
            address,
            timeout.as_millis()
        ),
    }
}
