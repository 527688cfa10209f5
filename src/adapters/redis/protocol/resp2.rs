//! RESP2 reply parser and command encoder.
//!
//! The client side of RESP2: replies are parsed incrementally out of a read
//! buffer, commands are encoded as arrays of bulk strings.
//! - Simple Strings (+)
//! - Errors (-)
//! - Integers (:)
//! - Bulk Strings ($)
//! - Arrays (*)
//! - Null (represented as $-1 or *-1)

use super::{ParseResult, RespType, MAX_BULK_SIZE, MAX_ELEMENTS, MAX_NESTING_DEPTH};
use crate::adapters::redis::{RedisError, RedisValue};
use bytes::Bytes;

/// Parse one complete frame off the front of `data`.
///
/// Returns the result and the number of bytes it occupied (0 unless `Ok`).
pub fn parse_frame(data: &[u8]) -> (ParseResult, usize) {
    let mut parser = Resp2Parser::new();
    parser.parse_value(data)
}

/// RESP2 parser state for a single frame.
#[derive(Debug, Default)]
struct Resp2Parser {
    /// Current nesting depth.
    depth: usize,
}

impl Resp2Parser {
    fn new() -> Self {
        Self::default()
    }

    /// Parse a value, returning (result, bytes_consumed).
    fn parse_value(&mut self, data: &[u8]) -> (ParseResult, usize) {
        let Some((&type_byte, rest)) = data.split_first() else {
            return (ParseResult::Incomplete, 0);
        };

        if self.depth > MAX_NESTING_DEPTH {
            return (
                ParseResult::Error("maximum nesting depth exceeded".to_string()),
                0,
            );
        }

        match RespType::from_byte(type_byte) {
            Some(RespType::SimpleString) => self.parse_simple_string(rest),
            Some(RespType::Error) => self.parse_error(rest),
            Some(RespType::Integer) => self.parse_integer(rest),
            Some(RespType::BulkString) => self.parse_bulk_string(rest),
            Some(RespType::Array) => self.parse_array(rest),
            None => (
                ParseResult::Error(format!("unexpected reply type byte 0x{:02x}", type_byte)),
                0,
            ),
        }
    }

    /// Parse a simple string (+OK\r\n).
    fn parse_simple_string(&self, data: &[u8]) -> (ParseResult, usize) {
        match find_crlf(data) {
            Some(pos) => {
                let s = String::from_utf8_lossy(&data[..pos]).to_string();
                (ParseResult::Ok(RedisValue::SimpleString(s)), pos + 3) // +1 for prefix, +2 for CRLF
            }
            None => (ParseResult::Incomplete, 0),
        }
    }

    /// Parse an error (-ERR message\r\n).
    fn parse_error(&self, data: &[u8]) -> (ParseResult, usize) {
        match find_crlf(data) {
            Some(pos) => {
                let s = String::from_utf8_lossy(&data[..pos]).to_string();
                let (kind, message) = parse_error_string(&s);
                (
                    ParseResult::Ok(RedisValue::Error(RedisError { kind, message })),
                    pos + 3,
                )
            }
            None => (ParseResult::Incomplete, 0),
        }
    }

    /// Parse an integer (:1000\r\n).
    fn parse_integer(&self, data: &[u8]) -> (ParseResult, usize) {
        match find_crlf(data) {
            Some(pos) => match parse_decimal(&data[..pos]) {
                Some(n) => (ParseResult::Ok(RedisValue::Integer(n)), pos + 3),
                None => (ParseResult::Error("invalid integer".to_string()), 0),
            },
            None => (ParseResult::Incomplete, 0),
        }
    }

    /// Parse a bulk string ($6\r\nfoobar\r\n).
    fn parse_bulk_string(&self, data: &[u8]) -> (ParseResult, usize) {
        let Some(len_pos) = find_crlf(data) else {
            return (ParseResult::Incomplete, 0);
        };

        match parse_decimal(&data[..len_pos]) {
            Some(-1) => (ParseResult::Ok(RedisValue::Null), len_pos + 3),
            Some(len) if len >= 0 => {
                let len = len as usize;
                if len > MAX_BULK_SIZE {
                    return (
                        ParseResult::Error(format!(
                            "bulk string too large: {} > {}",
                            len, MAX_BULK_SIZE
                        )),
                        0,
                    );
                }

                let data_start = len_pos + 2;
                let data_end = data_start + len;

                if data.len() < data_end + 2 {
                    return (ParseResult::Incomplete, 0);
                }

                if &data[data_end..data_end + 2] != b"\r\n" {
                    return (
                        ParseResult::Error("missing CRLF after bulk string".to_string()),
                        0,
                    );
                }

                let bytes = Bytes::copy_from_slice(&data[data_start..data_end]);
                (
                    ParseResult::Ok(RedisValue::BulkString(bytes)),
                    data_end + 3, // +1 for prefix, +2 for trailing CRLF
                )
            }
            _ => (
                ParseResult::Error("invalid bulk string length".to_string()),
                0,
            ),
        }
    }

    /// Parse an array (*2\r\n...).
    fn parse_array(&mut self, data: &[u8]) -> (ParseResult, usize) {
        let Some(len_pos) = find_crlf(data) else {
            return (ParseResult::Incomplete, 0);
        };

        match parse_decimal(&data[..len_pos]) {
            Some(-1) => (ParseResult::Ok(RedisValue::Null), len_pos + 3),
            Some(len) if len >= 0 => {
                let len = len as usize;
                if len > MAX_ELEMENTS {
                    return (
                        ParseResult::Error(format!("array too large: {} > {}", len, MAX_ELEMENTS)),
                        0,
                    );
                }

                self.depth += 1;
                let mut elements = Vec::with_capacity(len.min(1024));
                let mut offset = len_pos + 2;

                for _ in 0..len {
                    let (result, consumed) = self.parse_value(&data[offset..]);
                    match result {
                        ParseResult::Ok(value) => {
                            elements.push(value);
                            offset += consumed;
                        }
                        other => {
                            self.depth -= 1;
                            return (other, 0);
                        }
                    }
                }

                self.depth -= 1;
                // +1 for prefix
                (ParseResult::Ok(RedisValue::Array(elements)), offset + 1)
            }
            _ => (ParseResult::Error("invalid array length".to_string()), 0),
        }
    }
}

/// RESP2 encoder.
#[derive(Debug, Default)]
pub struct Resp2Encoder;

impl Resp2Encoder {
    /// Encode a value to bytes.
    pub fn encode(value: &RedisValue) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        Self::encode_into(value, &mut buf);
        buf
    }

    /// Encode a value into a buffer.
    pub fn encode_into(value: &RedisValue, buf: &mut Vec<u8>) {
        match value {
            RedisValue::SimpleString(s) => {
                buf.push(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RedisValue::Error(e) => {
                buf.push(b'-');
                buf.extend_from_slice(e.kind.as_bytes());
                if !e.message.is_empty() {
                    buf.push(b' ');
                    buf.extend_from_slice(e.message.as_bytes());
                }
                buf.extend_from_slice(b"\r\n");
            }
            RedisValue::Integer(n) => {
                buf.push(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RedisValue::BulkString(data) => {
                buf.push(b'$');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            RedisValue::Array(elements) => {
                buf.push(b'*');
                buf.extend_from_slice(elements.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                for elem in elements {
                    Self::encode_into(elem, buf);
                }
            }
            RedisValue::Null => {
                buf.extend_from_slice(b"$-1\r\n");
            }
        }
    }
}

/// Find CRLF in data, returning position of first \r.
fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn parse_decimal(data: &[u8]) -> Option<i64> {
    std::str::from_utf8(data).ok()?.parse().ok()
}

/// Parse error string into kind and message.
fn parse_error_string(s: &str) -> (String, String) {
    match s.split_once(' ') {
        Some((kind, message)) => (kind.to_string(), message.to_string()),
        None => (s.to_string(), String::new()),
    }
}
