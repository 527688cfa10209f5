//! Full rescan of existing records.
//!
//! Runs the record pipeline over every key matching a pattern. Seeds
//! summaries for data written before the service started, and recovers from
//! notifications lost while the subscriber was disconnected.

use crate::core::error::KitmaxResult;
use crate::pipeline::RecordPipeline;
use crate::store::RecordReader;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Totals for one backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Record keys found by the scan.
    pub scanned: u64,
    /// Records reconciled successfully.
    pub reconciled: u64,
    /// Records that failed extraction or reconciliation.
    pub failed: u64,
}

/// Backfill runner.
pub struct Backfill {
    records: Arc<dyn RecordReader>,
    pipeline: Arc<RecordPipeline>,
    max_in_flight: usize,
}

impl Backfill {
    /// Create a backfill runner.
    pub fn new(
        records: Arc<dyn RecordReader>,
        pipeline: Arc<RecordPipeline>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            records,
            pipeline,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Reconcile every record matching `pattern`.
    ///
    /// Per-record failures are counted, not returned; only a failed scan
    /// aborts the run.
    pub async fn run(&self, pattern: &str) -> KitmaxResult<BackfillReport> {
        let keys = self.records.scan_records(pattern).await?;
        let mut report = BackfillReport {
            scanned: keys.len() as u64,
            ..Default::default()
        };
        tracing::info!(pattern = %pattern, records = report.scanned, "backfill started");

        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();
        for key in keys {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let pipeline = Arc::clone(&self.pipeline);
            tasks.spawn(async move {
                let result = pipeline.process(&key).await;
                drop(permit);
                if let Err(ref e) = result {
                    tracing::warn!(key = %key, error = %e, "backfill record failed");
                }
                result.is_ok()
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => report.reconciled += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    tracing::error!(error = %e, "backfill task panicked");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            reconciled = report.reconciled,
            failed = report.failed,
            "backfill finished"
        );
        Ok(report)
    }
}
