//! Redis adapter.
//!
//! Talks RESP2 to a Redis server with the RedisJSON module loaded. Records
//! are JSON documents, kit summaries are hashes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Redis Adapter                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RedisStore (RecordReader + SummaryStore)                   │
//! │    JSON.GET │ HGET/HSET/HSETNX/HGETALL │ SCAN │ EVAL (raise) │
//! │    ↓                                                        │
//! │  ConnectionPool                                             │
//! │    ↓                                                        │
//! │  RespConnection (AUTH, SELECT, command timeout)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  KeyspaceSubscriber (dedicated connection, PSUBSCRIBE)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Error replies surface as `StoreRejected`; transport failures and timeouts
//! as `StoreUnavailable`.

pub mod client;
pub mod keyspace;
pub mod protocol;
pub mod store;

use bytes::Bytes;

pub use client::{ConnectionPool, RespConnection};
pub use keyspace::KeyspaceSubscriber;
pub use store::RedisStore;

/// Redis value type (RESP2 type system).
#[derive(Debug, Clone, PartialEq)]
pub enum RedisValue {
    /// Simple string (+OK\r\n)
    SimpleString(String),

    /// Error (-ERR message\r\n)
    Error(RedisError),

    /// Integer (:1000\r\n)
    Integer(i64),

    /// Bulk string ($6\r\nfoobar\r\n)
    BulkString(Bytes),

    /// Array (*2\r\n...)
    Array(Vec<RedisValue>),

    /// Null ($-1\r\n or *-1\r\n)
    Null,
}

impl RedisValue {
    /// Create a simple string.
    pub fn simple_string(s: impl Into<String>) -> Self {
        Self::SimpleString(s.into())
    }

    /// Create an OK response.
    pub fn ok() -> Self {
        Self::SimpleString("OK".to_string())
    }

    /// Create an error.
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(RedisError::new(kind, message))
    }

    /// Create a bulk string from a string.
    pub fn bulk_string(s: impl AsRef<str>) -> Self {
        Self::BulkString(Bytes::from(s.as_ref().to_string()))
    }

    /// Create an array.
    pub fn array(items: Vec<RedisValue>) -> Self {
        Self::Array(items)
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to get as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::SimpleString(s) => Some(s),
            Self::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Try to get as array.
    pub fn as_array(&self) -> Option<&[RedisValue]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Convert to array, consuming self.
    pub fn into_array(self) -> Option<Vec<RedisValue>> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Short type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SimpleString(_) => "simple string",
            Self::Error(_) => "error",
            Self::Integer(_) => "integer",
            Self::BulkString(_) => "bulk string",
            Self::Array(_) => "array",
            Self::Null => "null",
        }
    }
}

/// Redis error reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisError {
    /// Error kind (ERR, WRONGTYPE, NOSCRIPT, etc.)
    pub kind: String,
    /// Error message.
    pub message: String,
}

impl RedisError {
    /// Create a new error.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RedisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.message)
    }
}

impl std::error::Error for RedisError {}

/// Redis command.
#[derive(Debug, Clone)]
pub struct RedisCommand {
    /// Command name (uppercase).
    pub name: String,

    /// Command arguments.
    pub args: Vec<Bytes>,
}

impl RedisCommand {
    /// Create a new command with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            args: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    /// Append an integer argument.
    pub fn arg_int(self, n: i64) -> Self {
        self.arg(n.to_string())
    }

    /// Convert to the RESP array sent on the wire.
    pub fn to_value(&self) -> RedisValue {
        let mut items = Vec::with_capacity(self.args.len() + 1);
        items.push(RedisValue::bulk_string(&self.name));
        items.extend(self.args.iter().cloned().map(RedisValue::BulkString));
        RedisValue::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_value_accessors() {
        let s = RedisValue::simple_string("hello");
        assert_eq!(s.as_str(), Some("hello"));

        assert_eq!(RedisValue::bulk_string("17").as_str(), Some("17"));
        assert_eq!(RedisValue::Integer(42).as_str(), None);

        let arr = RedisValue::array(vec![RedisValue::Integer(1), RedisValue::Integer(2)]);
        assert_eq!(arr.as_array().map(|a| a.len()), Some(2));
        assert!(RedisValue::Null.is_null());
        assert_eq!(RedisValue::Null.type_name(), "null");
    }

    #[test]
    fn test_redis_command_builder() {
        let cmd = RedisCommand::new("hset")
            .arg("kit:osm")
            .arg("maxState")
            .arg_int(7);
        assert_eq!(cmd.name, "HSET");

        let value = cmd.to_value();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].as_str(), Some("HSET"));
        assert_eq!(items[1].as_str(), Some("kit:osm"));
        assert_eq!(items[3].as_str(), Some("7"));
    }

    #[test]
    fn test_redis_error_display() {
        let e = RedisError::new("WRONGTYPE", "Operation against a key holding the wrong kind of value");
        assert!(e.to_string().starts_with("WRONGTYPE "));
    }
}
