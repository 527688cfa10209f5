//! Main runtime orchestration.
//!
//! The runtime coordinates component lifecycle:
//! - Start order: store check → notification config → source + dispatcher → stats ticker
//!   → backfill (only after the subscription is acknowledged)
//! - Shutdown order: source + dispatcher (in-flight handlers drained) → backfill → stats ticker

use crate::adapters::redis::{KeyspaceSubscriber, RedisStore};
use crate::core::config::{Config, PipelineConfig};
use crate::events::{wait_for_shutdown, Dispatcher, EventSource};
use crate::kits::Backfill;
use crate::pipeline::{Aggregator, Extractor, PipelineStats, RecordPipeline};
use crate::store::{RecordReader, SummaryStore};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Queued events per permitted in-flight handler.
const QUEUE_DEPTH_PER_HANDLER: usize = 4;

/// How long shutdown waits for in-flight handlers.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Build the extract-then-reconcile pipeline from configuration.
pub fn build_pipeline(
    config: &PipelineConfig,
    records: Arc<dyn RecordReader>,
    summaries: Arc<dyn SummaryStore>,
    stats: Arc<PipelineStats>,
) -> RecordPipeline {
    RecordPipeline::new(
        Extractor::new(records),
        Aggregator::new(summaries, config.reconcile_mode),
        stats,
    )
}

/// Connect `source` to `dispatcher` through a bounded queue and run both
/// until the source is exhausted or shutdown is requested.
///
/// Returns once every in-flight handler has finished.
pub async fn serve(
    source: Box<dyn EventSource>,
    dispatcher: Dispatcher,
    shutdown: watch::Receiver<bool>,
    queue_depth: usize,
) -> Result<()> {
    let (tx, rx) = mpsc::channel(queue_depth.max(1));
    let name = source.name();
    tracing::info!(source = name, "event source starting");

    let source_task = tokio::spawn(source.run(tx, shutdown.clone()));
    dispatcher.run(rx, shutdown).await;

    source_task
        .await
        .with_context(|| format!("event source {} panicked", name))?
        .with_context(|| format!("event source {} failed", name))?;
    tracing::info!(source = name, "event source stopped");
    Ok(())
}

/// kitmax runtime.
pub struct Runtime {
    /// Configuration.
    config: Arc<Config>,

    /// Pipeline counters.
    stats: Arc<PipelineStats>,

    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,

    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,

    /// Backfill existing records once the subscription is live.
    backfill_on_subscribe: bool,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            config: Arc::new(config),
            stats: Arc::new(PipelineStats::new()),
            shutdown_tx,
            shutdown_rx,
            backfill_on_subscribe: false,
        })
    }

    /// Backfill every record matching the pipeline pattern as soon as the
    /// keyspace subscription is acknowledged.
    ///
    /// Records changed before the ack are covered by the scan, records
    /// changed after it by notifications, so nothing falls in between.
    pub fn with_backfill(mut self, enabled: bool) -> Self {
        self.backfill_on_subscribe = enabled;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the pipeline counters.
    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Get a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Run against Redis until Ctrl-C or [`shutdown`](Self::shutdown).
    pub async fn run(&self) -> Result<()> {
        let redis = &self.config.redis;
        tracing::info!(
            redis = %redis.address(),
            db = redis.db,
            pattern = %self.config.pipeline.record_pattern,
            mode = %self.config.pipeline.reconcile_mode,
            "starting kitmax runtime"
        );

        let store = Arc::new(RedisStore::new(redis.clone()));
        store
            .ping()
            .await
            .with_context(|| format!("redis at {} is not reachable", redis.address()))?;
        if let Some(ref flags) = redis.notify_keyspace_events {
            store
                .configure_notifications(flags)
                .await
                .context("failed to configure keyspace notifications")?;
        }

        let pipeline = Arc::new(build_pipeline(
            &self.config.pipeline,
            store.clone(),
            store.clone(),
            self.stats.clone(),
        ));
        let dispatcher = Dispatcher::new(
            pipeline.clone(),
            self.stats.clone(),
            self.config.pipeline.max_in_flight,
        )
        .with_ignore_removals(self.config.pipeline.ignore_removals);
        let mut source = KeyspaceSubscriber::new(
            redis.clone(),
            &self.config.pipeline.record_pattern,
            &self.config.subscriber,
        );

        let backfill = if self.backfill_on_subscribe {
            let (subscribed_tx, subscribed_rx) = watch::channel(false);
            source = source.with_subscribed_signal(subscribed_tx);
            Some(self.spawn_backfill(store, pipeline, subscribed_rx))
        } else {
            None
        };

        let mut service = tokio::spawn(serve(
            Box::new(source),
            dispatcher,
            self.shutdown_rx.clone(),
            self.config.pipeline.max_in_flight * QUEUE_DEPTH_PER_HANDLER,
        ));
        let ticker = self.spawn_stats_ticker();
        tracing::info!("kitmax runtime started");

        let mut shutdown_rx = self.shutdown_rx.clone();
        let finished = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received (SIGINT)");
                None
            }
            _ = wait_for_shutdown(&mut shutdown_rx) => {
                tracing::info!("shutdown requested by component");
                None
            }
            result = &mut service => Some(result),
        };

        let _ = self.shutdown_tx.send(true);
        let result = match finished {
            Some(result) => result,
            None => match tokio::time::timeout(SHUTDOWN_GRACE, service).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("in-flight handlers did not finish before the shutdown grace period");
                    Ok(Ok(()))
                }
            },
        };

        if let Some(backfill) = backfill {
            let _ = backfill.await;
        }
        if let Some(ticker) = ticker {
            let _ = ticker.await;
        }
        self.stats.snapshot().log("final pipeline stats");
        tracing::info!("kitmax runtime stopped");

        result.context("pipeline task panicked")?
    }

    fn spawn_backfill(
        &self,
        store: Arc<RedisStore>,
        pipeline: Arc<RecordPipeline>,
        mut subscribed: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let pattern = self.config.pipeline.record_pattern.clone();
        let backfill = Backfill::new(store, pipeline, self.config.pipeline.max_in_flight);
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => return,
                _ = wait_for_shutdown(&mut subscribed) => {}
            }

            tracing::info!(pattern = %pattern, "subscription live, starting backfill");
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => {
                    tracing::warn!(pattern = %pattern, "backfill interrupted by shutdown");
                }
                result = backfill.run(&pattern) => match result {
                    Ok(report) => tracing::info!(
                        pattern = %pattern,
                        scanned = report.scanned,
                        reconciled = report.reconciled,
                        failed = report.failed,
                        "startup backfill finished"
                    ),
                    Err(e) => tracing::error!(pattern = %pattern, error = %e, "startup backfill failed"),
                },
            }
        })
    }

    fn spawn_stats_ticker(&self) -> Option<JoinHandle<()>> {
        let seconds = self.config.telemetry.stats_interval_seconds;
        if seconds == 0 {
            return None;
        }

        let stats = self.stats.clone();
        let mut shutdown = self.shutdown_rx.clone();
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(seconds));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => break,
                    _ = interval.tick() => stats.snapshot().log("pipeline stats"),
                }
            }
        }))
    }
}
