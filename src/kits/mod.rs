//! Kit registry.
//!
//! Kits are registered explicitly with [`KitRegistry::create`] or come into
//! existence lazily the first time a record of theirs is reconciled. Both
//! produce the same `kit:<name>` summary hash.

pub mod backfill;

pub use backfill::{Backfill, BackfillReport};

use crate::core::error::{KitmaxError, KitmaxResult};
use crate::pipeline::{summary_key, MAX_STATE_FIELD, MAX_UPDATED_AT_FIELD, SUMMARY_KEY_PREFIX};
use crate::store::SummaryStore;
use serde::Serialize;
use std::sync::Arc;

/// Summary field holding the registered kit name.
pub const NAME_FIELD: &str = "name";

/// A kit and its current maxima.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KitSummary {
    /// Kit name.
    pub name: String,
    /// Highest state observed on any of the kit's records.
    pub max_state: i64,
    /// Most recent update timestamp observed on any of the kit's records.
    pub max_updated_at: i64,
}

impl KitSummary {
    /// Build a summary from the fields of a `kit:<name>` hash.
    ///
    /// The name falls back to the key suffix for lazily created kits; absent
    /// maxima read as 0.
    pub fn from_hash(key: &str, fields: &[(String, String)]) -> KitmaxResult<Self> {
        let lookup = |name: &str| {
            fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value.as_str())
        };
        let metric = |name: &str| -> KitmaxResult<i64> {
            match lookup(name) {
                Some(raw) => raw
                    .parse::<i64>()
                    .map_err(|e| KitmaxError::parse(key, name, raw, e)),
                None => Ok(0),
            }
        };

        let name = lookup(NAME_FIELD)
            .or_else(|| key.strip_prefix(SUMMARY_KEY_PREFIX))
            .unwrap_or(key)
            .to_string();

        Ok(Self {
            name,
            max_state: metric(MAX_STATE_FIELD)?,
            max_updated_at: metric(MAX_UPDATED_AT_FIELD)?,
        })
    }
}

/// Lists, inspects and registers kits.
#[derive(Clone)]
pub struct KitRegistry {
    store: Arc<dyn SummaryStore>,
}

impl KitRegistry {
    /// Create a registry over a summary store.
    pub fn new(store: Arc<dyn SummaryStore>) -> Self {
        Self { store }
    }

    /// List every kit, sorted by name.
    pub async fn list(&self) -> KitmaxResult<Vec<KitSummary>> {
        let pattern = format!("{}*", SUMMARY_KEY_PREFIX);
        let keys = self.store.scan_summaries(&pattern).await?;
        tracing::debug!(count = keys.len(), "fetched kit keys");

        let mut kits = Vec::with_capacity(keys.len());
        for key in keys {
            let fields = self.store.get_all(&key).await?;
            // Removed between the scan and the read.
            if fields.is_empty() {
                continue;
            }
            kits.push(KitSummary::from_hash(&key, &fields)?);
        }
        kits.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(kits)
    }

    /// Get one kit.
    pub async fn get(&self, name: &str) -> KitmaxResult<KitSummary> {
        let key = summary_key(name);
        let fields = self.store.get_all(&key).await?;
        if fields.is_empty() {
            return Err(KitmaxError::KitNotFound {
                name: name.to_string(),
            });
        }
        KitSummary::from_hash(&key, &fields)
    }

    /// Register a kit.
    ///
    /// Fails with `KitAlreadyExists` when the kit already has a name. Maxima
    /// start at 0 but an existing maximum from a lazily created summary is
    /// kept.
    pub async fn create(&self, name: &str) -> KitmaxResult<KitSummary> {
        let key = summary_key(name);
        tracing::info!(kit = %name, "creating kit");

        if !self.store.set_field_if_absent(&key, NAME_FIELD, name).await? {
            return Err(KitmaxError::KitAlreadyExists {
                name: name.to_string(),
            });
        }
        self.store
            .set_field_if_absent(&key, MAX_STATE_FIELD, "0")
            .await?;
        self.store
            .set_field_if_absent(&key, MAX_UPDATED_AT_FIELD, "0")
            .await?;

        self.get(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_summary_from_hash() {
        let fields = vec![
            ("maxState".to_string(), "7".to_string()),
            ("maxUpdatedAt".to_string(), "20".to_string()),
        ];
        let kit = KitSummary::from_hash("kit:osm", &fields).unwrap();
        assert_eq!(
            kit,
            KitSummary {
                name: "osm".to_string(),
                max_state: 7,
                max_updated_at: 20,
            }
        );

        let fields = vec![("maxState".to_string(), "x".to_string())];
        assert!(matches!(
            KitSummary::from_hash("kit:osm", &fields),
            Err(KitmaxError::Parse { .. })
        ));
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let kit = KitSummary {
            name: "osm".to_string(),
            max_state: 1,
            max_updated_at: 2,
        };
        let json = serde_json::to_value(&kit).unwrap();
        assert_eq!(json["maxState"], 1);
        assert_eq!(json["maxUpdatedAt"], 2);
    }

    #[tokio::test]
    async fn test_create_then_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let registry = KitRegistry::new(store.clone());

        let kit = registry.create("osm").await.unwrap();
        assert_eq!(kit.max_state, 0);
        assert_eq!(kit.max_updated_at, 0);

        assert!(matches!(
            registry.create("osm").await,
            Err(KitmaxError::KitAlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_keeps_lazy_maxima() {
        let store = Arc::new(MemoryStore::new());
        store.set_field("kit:osm", "maxState", "9").await.unwrap();
        let registry = KitRegistry::new(store.clone());

        let kit = registry.create("osm").await.unwrap();
        assert_eq!(kit.max_state, 9);
        assert_eq!(kit.max_updated_at, 0);
    }

    #[tokio::test]
    async fn test_list_and_get() {
        let store = Arc::new(MemoryStore::new());
        let registry = KitRegistry::new(store.clone());
        registry.create("zeta").await.unwrap();
        store.set_field("kit:alpha", "maxState", "3").await.unwrap();

        let names: Vec<_> = registry
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|k| k.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);

        assert_eq!(registry.get("alpha").await.unwrap().max_state, 3);
        assert!(matches!(
            registry.get("missing").await,
            Err(KitmaxError::KitNotFound { .. })
        ));
    }
}
