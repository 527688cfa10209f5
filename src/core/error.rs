//! Error types for the reconciliation pipeline and its store clients.
//!
//! Extraction errors (`MissingField`, `Parse`) are permanent for the record
//! that produced them. Store errors surface to the event-processing layer
//! untouched; nothing in the pipeline retries.

use thiserror::Error;

/// Common kitmax error conditions.
#[derive(Debug, Error)]
pub enum KitmaxError {
    /// A required field was absent (or JSON `null`) when read.
    #[error("missing field '{field}' on {key}")]
    MissingField { key: String, field: String },

    /// A field was present but did not have the expected shape.
    #[error("cannot parse field '{field}' on {key} (value {value:?}): {reason}")]
    Parse {
        key: String,
        field: String,
        value: String,
        reason: String,
    },

    /// Transport or connectivity failure talking to the store.
    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// The store answered with an error reply.
    #[error("store rejected command: {kind} {message}")]
    StoreRejected { kind: String, message: String },

    /// The store answered with a reply of an unexpected shape.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// A kit with this name is already registered.
    #[error("kit named {name} already exists")]
    KitAlreadyExists { name: String },

    /// No summary exists for this kit.
    #[error("kit {name} does not exist")]
    KitNotFound { name: String },
}

impl KitmaxError {
    /// Create a MissingField error.
    pub fn missing_field(key: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            key: key.into(),
            field: field.into(),
        }
    }

    /// Create a Parse error.
    pub fn parse(
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::Parse {
            key: key.into(),
            field: field.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a StoreUnavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Create a Protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Check if this error indicates the operation could succeed on retry.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Check if this error was raised while extracting a record.
    pub fn is_extraction_failure(&self) -> bool {
        matches!(self, Self::MissingField { .. } | Self::Parse { .. })
    }
}

impl From<std::io::Error> for KitmaxError {
    fn from(err: std::io::Error) -> Self {
        Self::unavailable(err.to_string())
    }
}

/// Result type using KitmaxError.
pub type KitmaxResult<T> = Result<T, KitmaxError>;
