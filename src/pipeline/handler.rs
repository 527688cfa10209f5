//! Record-change handling.

use super::{Aggregator, Extractor, PipelineStats, ReconcileOutcome};
use crate::core::error::KitmaxResult;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Handles one changed record key.
pub trait EventHandler: Send + Sync {
    /// Process the record at `key`.
    fn handle(&self, key: &str) -> Pin<Box<dyn Future<Output = KitmaxResult<()>> + Send + '_>>;
}

/// Extract-then-reconcile pipeline for a single record.
///
/// Extraction completes before the summary is touched, so a record with a
/// missing or malformed field never changes its kit.
#[derive(Clone)]
pub struct RecordPipeline {
    extractor: Extractor,
    aggregator: Aggregator,
    stats: Arc<PipelineStats>,
}

impl RecordPipeline {
    /// Create a pipeline.
    pub fn new(extractor: Extractor, aggregator: Aggregator, stats: Arc<PipelineStats>) -> Self {
        Self {
            extractor,
            aggregator,
            stats,
        }
    }

    /// Get the shared counters.
    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Run extraction and reconciliation for the record at `key`.
    ///
    /// Failures are counted by the stage that raised them: anything from
    /// extraction is an extraction failure, anything from reconciliation
    /// (including an unreadable stored maximum) is a reconcile failure.
    pub async fn process(&self, key: &str) -> KitmaxResult<ReconcileOutcome> {
        let fields = match self.extractor.extract(key).await {
            Ok(fields) => fields,
            Err(e) => {
                self.stats.record_extraction_failure();
                return Err(e);
            }
        };

        match self.aggregator.reconcile(&fields).await {
            Ok(outcome) => {
                self.stats.record_reconciled(outcome.raised_count());
                tracing::debug!(
                    key = %key,
                    summary = %outcome.summary_key,
                    state_raised = outcome.state_raised,
                    updated_at_raised = outcome.updated_at_raised,
                    "record reconciled"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.stats.record_reconcile_failure();
                Err(e)
            }
        }
    }
}

impl EventHandler for RecordPipeline {
    fn handle(&self, key: &str) -> Pin<Box<dyn Future<Output = KitmaxResult<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            self.process(&key).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::KitmaxError;
    use crate::pipeline::ReconcileMode;
    use crate::store::{MemoryStore, SummaryStore};
    use serde_json::json;

    fn pipeline(store: &Arc<MemoryStore>) -> RecordPipeline {
        RecordPipeline::new(
            Extractor::new(store.clone()),
            Aggregator::new(store.clone(), ReconcileMode::Atomic),
            Arc::new(PipelineStats::new()),
        )
    }

    #[tokio::test]
    async fn test_process_counts_outcomes() {
        let store = Arc::new(MemoryStore::new());
        store.put_record("tile:1", json!({"kit": "osm", "state": 2, "updatedAt": 9}));
        store.put_record("tile:2", json!({"kit": "osm", "state": 2}));
        let pipeline = pipeline(&store);

        let outcome = pipeline.process("tile:1").await.unwrap();
        assert_eq!(outcome.summary_key, "kit:osm");

        let err = pipeline.process("tile:2").await.unwrap_err();
        assert!(matches!(err, KitmaxError::MissingField { .. }));

        store.fail_after(0);
        assert!(pipeline.process("tile:1").await.is_err());
        store.heal();

        let snapshot = pipeline.stats().snapshot();
        assert_eq!(snapshot.records_reconciled, 1);
        assert_eq!(snapshot.metrics_raised, 2);
        assert_eq!(snapshot.extraction_failures, 1);
        assert_eq!(snapshot.reconcile_failures, 1);
    }

    #[tokio::test]
    async fn test_unreadable_stored_maximum_counts_as_reconcile_failure() {
        let store = Arc::new(MemoryStore::new());
        store.set_field("kit:x", "maxState", "junk").await.unwrap();
        store.put_record("tile:1", json!({"kit": "x", "state": 3, "updatedAt": 10}));
        let pipeline = pipeline(&store);

        let err = pipeline.process("tile:1").await.unwrap_err();
        assert!(matches!(err, KitmaxError::Parse { ref field, .. } if field == "maxState"));

        let snapshot = pipeline.stats().snapshot();
        assert_eq!(snapshot.extraction_failures, 0);
        assert_eq!(snapshot.reconcile_failures, 1);
        assert_eq!(snapshot.records_reconciled, 0);
    }

    #[tokio::test]
    async fn test_handler_discards_outcome() {
        let store = Arc::new(MemoryStore::new());
        store.put_record("tile:1", json!({"kit": "x", "state": 3, "updatedAt": 10}));
        let pipeline = pipeline(&store);

        pipeline.handle("tile:1").await.unwrap();
        assert_eq!(
            store.get_field("kit:x", "maxState").await.unwrap(),
            Some("3".to_string())
        );
    }
}
