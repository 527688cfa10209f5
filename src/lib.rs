//! kitmax - incremental per-kit maxima over tile records.
//!
//! Every tile record belongs to a kit and carries a `state` number and an
//! `updatedAt` timestamp. kitmax watches record changes and keeps a summary
//! per kit whose `maxState` / `maxUpdatedAt` are the largest values observed
//! on any of that kit's records. Summaries only ever go up.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Event Sources                           │
//! │     Redis keyspace notifications  │  in-process channel         │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │ KeyEvent
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Dispatcher                             │
//! │            (removal filtering, bounded concurrency)             │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │ key
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Record Pipeline                          │
//! │          Extractor (kit, state, updatedAt) → Aggregator         │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Store                                │
//! │       Redis (JSON records, hash summaries) │ MemoryStore        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Service orchestration
//! - [`core::error`] - Error types
//!
//! ## Pipeline
//! - [`pipeline::extractor`] - Record field extraction
//! - [`pipeline::aggregator`] - Summary reconciliation
//! - [`pipeline::handler`] - Per-record processing
//! - [`pipeline::stats`] - Counters
//!
//! ## Events
//! - [`events::dispatcher`] - Event dispatch
//! - [`events::pattern`] - Key glob matching
//!
//! ## Store
//! - [`store::memory`] - In-process store
//! - [`adapters::redis`] - Redis client, store and keyspace subscriber
//!
//! ## Kits
//! - [`kits`] - Kit registry
//! - [`kits::backfill`] - Full rescan

pub mod adapters;
pub mod cli;
pub mod core;
pub mod events;
pub mod kits;
pub mod pipeline;
pub mod store;

pub use crate::core::error::{KitmaxError, KitmaxResult};
