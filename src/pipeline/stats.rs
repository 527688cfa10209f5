//! Pipeline counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the dispatcher and the record pipeline.
///
/// These are observability only and never feed back into reconciliation.
#[derive(Debug, Default)]
pub struct PipelineStats {
    events_received: AtomicU64,
    events_skipped: AtomicU64,
    records_reconciled: AtomicU64,
    metrics_raised: AtomicU64,
    extraction_failures: AtomicU64,
    reconcile_failures: AtomicU64,
}

impl PipelineStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.events_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a completed reconciliation and how many metrics it raised.
    pub fn record_reconciled(&self, raised: u64) {
        self.records_reconciled.fetch_add(1, Ordering::Relaxed);
        self.metrics_raised.fetch_add(raised, Ordering::Relaxed);
    }

    pub fn record_extraction_failure(&self) {
        self.extraction_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a reconciliation that failed after extraction succeeded.
    pub fn record_reconcile_failure(&self) {
        self.reconcile_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of all counters.
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_skipped: self.events_skipped.load(Ordering::Relaxed),
            records_reconciled: self.records_reconciled.load(Ordering::Relaxed),
            metrics_raised: self.metrics_raised.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            reconcile_failures: self.reconcile_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatsSnapshot {
    pub events_received: u64,
    pub events_skipped: u64,
    pub records_reconciled: u64,
    pub metrics_raised: u64,
    pub extraction_failures: u64,
    pub reconcile_failures: u64,
}

impl PipelineStatsSnapshot {
    /// Emit the snapshot as a structured log line.
    pub fn log(&self, message: &'static str) {
        tracing::info!(
            received = self.events_received,
            skipped = self.events_skipped,
            reconciled = self.records_reconciled,
            raised = self.metrics_raised,
            extraction_failures = self.extraction_failures,
            reconcile_failures = self.reconcile_failures,
            "{}",
            message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = PipelineStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_skipped();
        stats.record_reconciled(2);
        stats.record_reconciled(0);
        stats.record_extraction_failure();
        stats.record_reconcile_failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.events_received, 2);
        assert_eq!(snapshot.events_skipped, 1);
        assert_eq!(snapshot.records_reconciled, 2);
        assert_eq!(snapshot.metrics_raised, 2);
        assert_eq!(snapshot.extraction_failures, 1);
        assert_eq!(snapshot.reconcile_failures, 1);
    }
}
