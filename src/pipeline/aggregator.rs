//! Kit summary reconciliation.
//!
//! Raises a kit summary so that `maxState` and `maxUpdatedAt` cover a newly
//! observed record. Two strategies are available:
//!
//! | Mode | Store calls | Concurrent updates to one kit |
//! |------|-------------|-------------------------------|
//! | [`ReconcileMode::Atomic`] | one `raise_fields` | safe, both metrics applied together |
//! | [`ReconcileMode::ReadThenWrite`] | `get_field` + optional `set_field` per metric | lost updates possible; a failure between metrics leaves one applied |
//!
//! Both are idempotent: replaying an applied value never writes.

use super::{NormalizedFields, MAX_STATE_FIELD, MAX_UPDATED_AT_FIELD};
use crate::core::error::{KitmaxError, KitmaxResult};
use crate::store::SummaryStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Reconciliation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcileMode {
    /// Single atomic max-update covering both metrics.
    #[default]
    Atomic,
    /// Separate read and conditional write per metric.
    ReadThenWrite,
}

impl std::fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Atomic => write!(f, "atomic"),
            Self::ReadThenWrite => write!(f, "read-then-write"),
        }
    }
}

/// What a reconciliation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Summary key that was reconciled.
    pub summary_key: String,
    /// Whether `maxState` was written.
    pub state_raised: bool,
    /// Whether `maxUpdatedAt` was written.
    pub updated_at_raised: bool,
}

impl ReconcileOutcome {
    /// Number of metrics written.
    pub fn raised_count(&self) -> u64 {
        u64::from(self.state_raised) + u64::from(self.updated_at_raised)
    }

    /// Whether anything was written.
    pub fn changed(&self) -> bool {
        self.state_raised || self.updated_at_raised
    }
}

/// Reconciles kit summaries against observed records.
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn SummaryStore>,
    mode: ReconcileMode,
}

impl Aggregator {
    /// Create an aggregator.
    pub fn new(store: Arc<dyn SummaryStore>, mode: ReconcileMode) -> Self {
        Self { store, mode }
    }

    /// Raise the owning kit's summary to cover `fields`.
    pub async fn reconcile(&self, fields: &NormalizedFields) -> KitmaxResult<ReconcileOutcome> {
        let summary_key = fields.summary_key();

        let (state_raised, updated_at_raised) = match self.mode {
            ReconcileMode::Atomic => {
                let raised = self
                    .store
                    .raise_fields(
                        &summary_key,
                        &[
                            (MAX_STATE_FIELD, fields.state),
                            (MAX_UPDATED_AT_FIELD, fields.updated_at),
                        ],
                    )
                    .await?;
                match raised.as_slice() {
                    [state, updated_at] => (*state, *updated_at),
                    other => {
                        return Err(KitmaxError::protocol(format!(
                            "raise_fields returned {} results for 2 fields",
                            other.len()
                        )))
                    }
                }
            }
            ReconcileMode::ReadThenWrite => {
                let state = self
                    .raise_unguarded(&summary_key, MAX_STATE_FIELD, fields.state)
                    .await?;
                let updated_at = self
                    .raise_unguarded(&summary_key, MAX_UPDATED_AT_FIELD, fields.updated_at)
                    .await?;
                (state, updated_at)
            }
        };

        Ok(ReconcileOutcome {
            summary_key,
            state_raised,
            updated_at_raised,
        })
    }

    /// Read the stored maximum, then write `incoming` if it is strictly greater.
    async fn raise_unguarded(&self, key: &str, field: &str, incoming: i64) -> KitmaxResult<bool> {
        let current = match self.store.get_field(key, field).await? {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|e| KitmaxError::parse(key, field, raw.as_str(), e))?,
            None => 0,
        };

        if incoming <= current {
            return Ok(false);
        }

        self.store
            .set_field(key, field, &incoming.to_string())
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn summary(store: &MemoryStore, key: &str) -> (Option<String>, Option<String>) {
        (
            store.get_field(key, MAX_STATE_FIELD).await.unwrap(),
            store.get_field(key, MAX_UPDATED_AT_FIELD).await.unwrap(),
        )
    }

    #[tokio::test]
    async fn test_lazy_default_in_both_modes() {
        for mode in [ReconcileMode::Atomic, ReconcileMode::ReadThenWrite] {
            let store = Arc::new(MemoryStore::new());
            let aggregator = Aggregator::new(store.clone(), mode);

            let outcome = aggregator
                .reconcile(&NormalizedFields::new("g", 5, 100))
                .await
                .unwrap();
            assert_eq!(outcome.summary_key, "kit:g");
            assert_eq!(outcome.raised_count(), 2);
            assert_eq!(
                summary(&store, "kit:g").await,
                (Some("5".to_string()), Some("100".to_string()))
            );
        }
    }

    #[tokio::test]
    async fn test_replay_is_noop() {
        for mode in [ReconcileMode::Atomic, ReconcileMode::ReadThenWrite] {
            let store = Arc::new(MemoryStore::new());
            let aggregator = Aggregator::new(store.clone(), mode);
            let fields = NormalizedFields::new("g", 3, 10);

            assert!(aggregator.reconcile(&fields).await.unwrap().changed());
            let replay = aggregator.reconcile(&fields).await.unwrap();
            assert!(!replay.changed());
            assert_eq!(
                summary(&store, "kit:g").await,
                (Some("3".to_string()), Some("10".to_string()))
            );
        }
    }

    #[tokio::test]
    async fn test_negative_values_do_not_create_fields() {
        let store = Arc::new(MemoryStore::new());
        let aggregator = Aggregator::new(store.clone(), ReconcileMode::Atomic);

        let outcome = aggregator
            .reconcile(&NormalizedFields::new("g", -1, 4))
            .await
            .unwrap();
        assert!(!outcome.state_raised);
        assert!(outcome.updated_at_raised);
        assert_eq!(summary(&store, "kit:g").await, (None, Some("4".to_string())));
    }

    #[tokio::test]
    async fn test_garbage_stored_maximum_is_parse_error() {
        for mode in [ReconcileMode::Atomic, ReconcileMode::ReadThenWrite] {
            let store = Arc::new(MemoryStore::new());
            store.set_field("kit:g", MAX_STATE_FIELD, "lots").await.unwrap();
            let aggregator = Aggregator::new(store.clone(), mode);

            let result = aggregator.reconcile(&NormalizedFields::new("g", 1, 1)).await;
            assert!(matches!(result, Err(KitmaxError::Parse { .. })), "{mode}");
        }
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(ReconcileMode::Atomic.to_string(), "atomic");
        assert_eq!(ReconcileMode::ReadThenWrite.to_string(), "read-then-write");
    }
}
