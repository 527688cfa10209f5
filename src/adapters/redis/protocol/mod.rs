//! RESP2 wire protocol.

pub mod resp2;

pub use resp2::{parse_frame, Resp2Encoder};

use super::RedisValue;

/// Maximum nesting depth for arrays.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Maximum bulk string size (512MB).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array elements.
pub const MAX_ELEMENTS: usize = 1_000_000;

/// RESP2 type byte prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespType {
    /// Simple string (+)
    SimpleString,
    /// Error (-)
    Error,
    /// Integer (:)
    Integer,
    /// Bulk string ($)
    BulkString,
    /// Array (*)
    Array,
}

impl RespType {
    /// Get the type from a prefix byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'+' => Some(Self::SimpleString),
            b'-' => Some(Self::Error),
            b':' => Some(Self::Integer),
            b'$' => Some(Self::BulkString),
            b'*' => Some(Self::Array),
            _ => None,
        }
    }
}

/// Parse result.
#[derive(Debug)]
pub enum ParseResult {
    /// Successfully parsed a value.
    Ok(RedisValue),
    /// Need more data.
    Incomplete,
    /// Parse error.
    Error(String),
}
