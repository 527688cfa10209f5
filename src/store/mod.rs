//! Store capabilities used by the pipeline.
//!
//! The pipeline never talks to a global client. Components receive the
//! capability they need:
//! - [`RecordReader`] - field reads on record documents (the Extractor side)
//! - [`SummaryStore`] - field operations on per-kit summary hashes (the
//!   Aggregator side, kit registry and health checks)
//!
//! Implementations:
//! - [`memory::MemoryStore`] - in-process store with change notifications
//! - [`crate::adapters::redis::RedisStore`] - Redis (RedisJSON records, hash summaries)

pub mod memory;

use crate::core::error::KitmaxResult;
use std::future::Future;
use std::pin::Pin;

pub use memory::MemoryStore;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = KitmaxResult<T>> + Send + 'a>>;

/// Read access to record documents.
pub trait RecordReader: Send + Sync {
    /// Read one field of a record.
    ///
    /// Returns the field's compact JSON text (strings keep their quotes),
    /// or `None` when the record, the field, or its value is absent/null.
    fn read_field(&self, key: &str, field: &str) -> StoreFuture<'_, Option<String>>;

    /// List record keys matching a glob pattern.
    fn scan_records(&self, pattern: &str) -> StoreFuture<'_, Vec<String>>;
}

/// Field access to summary hashes.
pub trait SummaryStore: Send + Sync {
    /// Read one hash field.
    fn get_field(&self, key: &str, field: &str) -> StoreFuture<'_, Option<String>>;

    /// Write one hash field.
    fn set_field(&self, key: &str, field: &str, value: &str) -> StoreFuture<'_, ()>;

    /// Write one hash field only if it is absent. Returns whether it was written.
    fn set_field_if_absent(&self, key: &str, field: &str, value: &str) -> StoreFuture<'_, bool>;

    /// Atomically raise each field to `max(stored, incoming)`.
    ///
    /// Absent fields count as 0. Every stored value is validated before any
    /// write, so either all raises apply or none do. Returns, per update,
    /// whether the field was written.
    fn raise_fields(&self, key: &str, updates: &[(&str, i64)]) -> StoreFuture<'_, Vec<bool>>;

    /// Read every field of a hash (empty when the hash does not exist).
    fn get_all(&self, key: &str) -> StoreFuture<'_, Vec<(String, String)>>;

    /// List summary keys matching a glob pattern.
    fn scan_summaries(&self, pattern: &str) -> StoreFuture<'_, Vec<String>>;

    /// Liveness check.
    fn ping(&self) -> StoreFuture<'_, ()>;
}
