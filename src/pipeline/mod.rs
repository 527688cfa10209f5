//! Incremental kit-maxima pipeline.
//!
//! Each record-change event runs two stages:
//! - [`extractor`] - reads `kit`, `state` and `updatedAt` off the record
//! - [`aggregator`] - raises the kit summary's `maxState` / `maxUpdatedAt`
//!
//! [`handler::RecordPipeline`] wires the two together behind the
//! [`handler::EventHandler`] interface the dispatcher and backfill use.

pub mod aggregator;
pub mod extractor;
pub mod handler;
pub mod stats;

pub use aggregator::{Aggregator, ReconcileMode, ReconcileOutcome};
pub use extractor::Extractor;
pub use handler::{EventHandler, RecordPipeline};
pub use stats::{PipelineStats, PipelineStatsSnapshot};

/// Record field holding the quoted kit name.
pub const KIT_FIELD: &str = "kit";

/// Record field holding the state number.
pub const STATE_FIELD: &str = "state";

/// Record field holding the update timestamp.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Summary field holding the maximum observed state.
pub const MAX_STATE_FIELD: &str = "maxState";

/// Summary field holding the maximum observed update timestamp.
pub const MAX_UPDATED_AT_FIELD: &str = "maxUpdatedAt";

/// Prefix of every kit summary key.
pub const SUMMARY_KEY_PREFIX: &str = "kit:";

/// Derive the summary key for a kit.
pub fn summary_key(group_id: &str) -> String {
    format!("{}{}", SUMMARY_KEY_PREFIX, group_id)
}

/// Fields extracted from one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedFields {
    /// Kit name with its delimiters stripped.
    pub group_id: String,
    /// Record state.
    pub state: i64,
    /// Record update timestamp.
    pub updated_at: i64,
}

impl NormalizedFields {
    /// Create a field tuple.
    pub fn new(group_id: impl Into<String>, state: i64, updated_at: i64) -> Self {
        Self {
            group_id: group_id.into(),
            state,
            updated_at,
        }
    }

    /// Summary key of the owning kit.
    pub fn summary_key(&self) -> String {
        summary_key(&self.group_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_key() {
        assert_eq!(summary_key("osm"), "kit:osm");
        assert_eq!(NormalizedFields::new("x", 1, 2).summary_key(), "kit:x");
    }
}
