//! Core runtime infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Service orchestration and shutdown
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod runtime;
