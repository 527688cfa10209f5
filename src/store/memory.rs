//! In-process store.
//!
//! Records are JSON documents, summaries are string hashes. Every record
//! write or removal is pushed to subscribers whose glob pattern matches the
//! key, which makes this store usable end to end with
//! [`crate::events::ChannelSource`].

use super::{RecordReader, StoreFuture, SummaryStore};
use crate::core::error::{KitmaxError, KitmaxResult};
use crate::events::{pattern_matches, KeyEvent};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

type Hash = BTreeMap<String, String>;

struct Subscriber {
    pattern: String,
    tx: mpsc::UnboundedSender<KeyEvent>,
}

/// In-memory record and summary store.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, Value>>,
    hashes: RwLock<BTreeMap<String, Hash>>,
    subscribers: Mutex<Vec<Subscriber>>,
    /// Store operations left before injected failures start.
    failure_budget: Mutex<Option<u64>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record document.
    pub fn put_record(&self, key: &str, document: Value) {
        self.records.write().insert(key.to_string(), document);
        self.notify(KeyEvent::updated(key));
    }

    /// Set one field of a record, creating the record if needed.
    pub fn set_record_field(&self, key: &str, field: &str, value: Value) {
        {
            let mut records = self.records.write();
            let document = records
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
            if !document.is_object() {
                *document = Value::Object(Default::default());
            }
            if let Value::Object(map) = document {
                map.insert(field.to_string(), value);
            }
        }
        self.notify(KeyEvent::updated(key));
    }

    /// Remove a record. Returns whether it existed.
    pub fn remove_record(&self, key: &str) -> bool {
        let existed = self.records.write().remove(key).is_some();
        if existed {
            self.notify(KeyEvent::removed(key));
        }
        existed
    }

    /// Receive change events for record keys matching `pattern`.
    pub fn subscribe(&self, pattern: &str) -> mpsc::UnboundedReceiver<KeyEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber {
            pattern: pattern.to_string(),
            tx,
        });
        rx
    }

    /// Let `ops` more store operations succeed, then fail every one with
    /// `StoreUnavailable` until [`heal`](Self::heal) is called.
    ///
    /// Only trait operations count; direct record writes are unaffected.
    pub fn fail_after(&self, ops: u64) {
        *self.failure_budget.lock() = Some(ops);
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        *self.failure_budget.lock() = None;
    }

    /// Snapshot of a summary hash.
    pub fn summary(&self, key: &str) -> Option<Hash> {
        self.hashes.read().get(key).cloned()
    }

    fn notify(&self, event: KeyEvent) {
        self.subscribers.lock().retain(|sub| {
            if !pattern_matches(&sub.pattern, &event.key) {
                return !sub.tx.is_closed();
            }
            sub.tx.send(event.clone()).is_ok()
        });
    }

    fn check(&self) -> KitmaxResult<()> {
        let mut budget = self.failure_budget.lock();
        match budget.as_mut() {
            None => Ok(()),
            Some(0) => Err(KitmaxError::unavailable("injected store failure")),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
        }
    }

    fn read_field_now(&self, key: &str, field: &str) -> KitmaxResult<Option<String>> {
        self.check()?;
        let records = self.records.read();
        Ok(records
            .get(key)
            .and_then(|document| document.get(field))
            .filter(|value| !value.is_null())
            .map(Value::to_string))
    }

    fn raise_now(&self, key: &str, updates: &[(&str, i64)]) -> KitmaxResult<Vec<bool>> {
        self.check()?;
        let mut hashes = self.hashes.write();

        let mut raised = Vec::with_capacity(updates.len());
        for (field, incoming) in updates {
            let stored = match hashes.get(key).and_then(|hash| hash.get(*field)) {
                Some(raw) => raw
                    .parse::<i64>()
                    .map_err(|e| KitmaxError::parse(key, *field, raw.as_str(), e))?,
                None => 0,
            };
            raised.push(*incoming > stored);
        }

        if raised.iter().any(|r| *r) {
            let hash = hashes.entry(key.to_string()).or_default();
            for ((field, incoming), _) in updates.iter().zip(&raised).filter(|(_, r)| **r) {
                hash.insert(field.to_string(), incoming.to_string());
            }
        }
        Ok(raised)
    }

    fn scan<V>(&self, map: &BTreeMap<String, V>, pattern: &str) -> KitmaxResult<Vec<String>> {
        self.check()?;
        Ok(map
            .keys()
            .filter(|key| pattern_matches(pattern, key))
            .cloned()
            .collect())
    }
}

impl RecordReader for MemoryStore {
    fn read_field(&self, key: &str, field: &str) -> StoreFuture<'_, Option<String>> {
        let result = self.read_field_now(key, field);
        Box::pin(std::future::ready(result))
    }

    fn scan_records(&self, pattern: &str) -> StoreFuture<'_, Vec<String>> {
        let result = self.scan(&*self.records.read(), pattern);
        Box::pin(std::future::ready(result))
    }
}

impl SummaryStore for MemoryStore {
    fn get_field(&self, key: &str, field: &str) -> StoreFuture<'_, Option<String>> {
        let result = self
            .check()
            .map(|_| self.hashes.read().get(key).and_then(|h| h.get(field)).cloned());
        Box::pin(std::future::ready(result))
    }

    fn set_field(&self, key: &str, field: &str, value: &str) -> StoreFuture<'_, ()> {
        let result = self.check().map(|_| {
            self.hashes
                .write()
                .entry(key.to_string())
                .or_default()
                .insert(field.to_string(), value.to_string());
        });
        Box::pin(std::future::ready(result))
    }

    fn set_field_if_absent(&self, key: &str, field: &str, value: &str) -> StoreFuture<'_, bool> {
        let result = self.check().map(|_| {
            let mut hashes = self.hashes.write();
            let hash = hashes.entry(key.to_string()).or_default();
            if hash.contains_key(field) {
                return false;
            }
            hash.insert(field.to_string(), value.to_string());
            true
        });
        Box::pin(std::future::ready(result))
    }

    fn raise_fields(&self, key: &str, updates: &[(&str, i64)]) -> StoreFuture<'_, Vec<bool>> {
        let result = self.raise_now(key, updates);
        Box::pin(std::future::ready(result))
    }

    fn get_all(&self, key: &str) -> StoreFuture<'_, Vec<(String, String)>> {
        let result = self.check().map(|_| {
            self.hashes
                .read()
                .get(key)
                .map(|hash| hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
                .unwrap_or_default()
        });
        Box::pin(std::future::ready(result))
    }

    fn scan_summaries(&self, pattern: &str) -> StoreFuture<'_, Vec<String>> {
        let result = self.scan(&*self.hashes.read(), pattern);
        Box::pin(std::future::ready(result))
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(std::future::ready(self.check()))
    }
}
