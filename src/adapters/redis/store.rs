//! Redis-backed record reader and summary store.

use super::client::ConnectionPool;
use super::{RedisCommand, RedisValue};
use crate::core::config::RedisConfig;
use crate::core::error::{KitmaxError, KitmaxResult};
use crate::store::{RecordReader, StoreFuture, SummaryStore};
use std::collections::BTreeSet;

/// Keys requested per SCAN round trip.
const SCAN_COUNT: i64 = 256;

/// Error kind the raise script replies with when a stored value is not an integer.
const NONNUMERIC: &str = "NONNUMERIC";

/// Raise each `ARGV[2i-1]` field of `KEYS[1]` to `ARGV[2i]` when strictly
/// greater. Every stored value is checked before the first write.
///
/// Values never become Lua numbers. Both sides are normalised to a sign and a
/// digit string without leading zeros, then ordered by sign, digit count and
/// finally the digits themselves, which is exact for any integer width.
const RAISE_SCRIPT: &str = r#"
local function normalize(raw)
  local sign, digits = string.match(raw, '^(%-?)(%d+)$')
  if not sign then
    return nil
  end
  digits = string.gsub(digits, '^0+', '')
  if digits == '' then
    return '', '0'
  end
  return sign, digits
end

local function greater(a_sign, a_digits, b_sign, b_digits)
  if a_sign ~= b_sign then
    return b_sign == '-'
  end
  local larger
  if #a_digits ~= #b_digits then
    larger = #a_digits > #b_digits
  elseif a_digits ~= b_digits then
    larger = a_digits > b_digits
  else
    return false
  end
  if a_sign == '-' then
    return not larger
  end
  return larger
end

local pending = {}
for i = 1, #ARGV, 2 do
  local field = ARGV[i]
  local raw = redis.call('HGET', KEYS[1], field)
  local stored_sign, stored_digits = '', '0'
  if raw then
    stored_sign, stored_digits = normalize(raw)
    if not stored_sign then
      return redis.error_reply('NONNUMERIC ' .. field .. ' ' .. raw)
    end
  end
  local sign, digits = normalize(ARGV[i + 1])
  if not sign then
    return redis.error_reply('NONNUMERIC ' .. field .. ' ' .. ARGV[i + 1])
  end
  pending[#pending + 1] = { field, ARGV[i + 1], greater(sign, digits, stored_sign, stored_digits) }
end
local raised = {}
for i, entry in ipairs(pending) do
  if entry[3] then
    redis.call('HSET', KEYS[1], entry[1], entry[2])
    raised[i] = 1
  else
    raised[i] = 0
  end
end
return raised
"#;

/// Redis store: RedisJSON records, hash summaries.
pub struct RedisStore {
    pool: ConnectionPool,
}

impl RedisStore {
    /// Create a store. Connections are opened on first use.
    pub fn new(config: RedisConfig) -> Self {
        Self {
            pool: ConnectionPool::new(config),
        }
    }

    /// Get the connection configuration.
    pub fn config(&self) -> &RedisConfig {
        self.pool.config()
    }

    /// Enable keyspace notifications on the server.
    pub async fn configure_notifications(&self, flags: &str) -> KitmaxResult<()> {
        let command = RedisCommand::new("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg(flags);
        self.pool.request(&command).await?;
        tracing::info!(flags = %flags, "keyspace notifications configured");
        Ok(())
    }

    async fn json_field(&self, key: &str, field: &str) -> KitmaxResult<Option<String>> {
        let command = RedisCommand::new("JSON.GET")
            .arg(key)
            .arg(format!("$.{}", field));
        let reply = self.pool.request(&command).await?;
        parse_json_path_reply(&reply)
    }

    async fn scan(&self, pattern: &str, type_filter: Option<&str>) -> KitmaxResult<Vec<String>> {
        let mut keys = BTreeSet::new();
        let mut cursor = "0".to_string();
        loop {
            let mut command = RedisCommand::new("SCAN")
                .arg(&cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg_int(SCAN_COUNT);
            if let Some(kind) = type_filter {
                command = command.arg("TYPE").arg(kind);
            }

            let reply = self.pool.request(&command).await?;
            let (next, batch) = parse_scan_reply(reply)?;
            keys.extend(batch);
            if next == "0" {
                break;
            }
            cursor = next;
        }
        Ok(keys.into_iter().collect())
    }

    async fn raise(&self, key: &str, updates: &[(String, i64)]) -> KitmaxResult<Vec<bool>> {
        let mut command = RedisCommand::new("EVAL")
            .arg(RAISE_SCRIPT)
            .arg_int(1)
            .arg(key);
        for (field, incoming) in updates {
            command = command.arg(field).arg_int(*incoming);
        }

        let reply = match self.pool.request(&command).await {
            Err(KitmaxError::StoreRejected { kind, message }) if kind == NONNUMERIC => {
                let (field, value) = message.split_once(' ').unwrap_or((message.as_str(), ""));
                return Err(KitmaxError::parse(
                    key,
                    field,
                    value,
                    "stored maximum is not an integer",
                ));
            }
            other => other?,
        };

        let items = reply
            .into_array()
            .ok_or_else(|| KitmaxError::protocol("raise script returned a non-array reply"))?;
        if items.len() != updates.len() {
            return Err(KitmaxError::protocol(format!(
                "raise script returned {} results for {} fields",
                items.len(),
                updates.len()
            )));
        }
        items.iter().map(|item| expect_int(item).map(|n| n == 1)).collect()
    }
}

impl RecordReader for RedisStore {
    fn read_field(&self, key: &str, field: &str) -> StoreFuture<'_, Option<String>> {
        let key = key.to_string();
        let field = field.to_string();
        Box::pin(async move { self.json_field(&key, &field).await })
    }

    fn scan_records(&self, pattern: &str) -> StoreFuture<'_, Vec<String>> {
        let pattern = pattern.to_string();
        Box::pin(async move { self.scan(&pattern, None).await })
    }
}

impl SummaryStore for RedisStore {
    fn get_field(&self, key: &str, field: &str) -> StoreFuture<'_, Option<String>> {
        let command = RedisCommand::new("HGET").arg(key).arg(field);
        Box::pin(async move {
            let reply = self.pool.request(&command).await?;
            expect_optional_string(&reply)
        })
    }

    fn set_field(&self, key: &str, field: &str, value: &str) -> StoreFuture<'_, ()> {
        let command = RedisCommand::new("HSET").arg(key).arg(field).arg(value);
        Box::pin(async move {
            let reply = self.pool.request(&command).await?;
            expect_int(&reply)?;
            Ok(())
        })
    }

    fn set_field_if_absent(&self, key: &str, field: &str, value: &str) -> StoreFuture<'_, bool> {
        let command = RedisCommand::new("HSETNX").arg(key).arg(field).arg(value);
        Box::pin(async move {
            let reply = self.pool.request(&command).await?;
            Ok(expect_int(&reply)? == 1)
        })
    }

    fn raise_fields(&self, key: &str, updates: &[(&str, i64)]) -> StoreFuture<'_, Vec<bool>> {
        let key = key.to_string();
        let updates: Vec<(String, i64)> = updates
            .iter()
            .map(|(field, incoming)| (field.to_string(), *incoming))
            .collect();
        Box::pin(async move { self.raise(&key, &updates).await })
    }

    fn get_all(&self, key: &str) -> StoreFuture<'_, Vec<(String, String)>> {
        let command = RedisCommand::new("HGETALL").arg(key);
        Box::pin(async move {
            let reply = self.pool.request(&command).await?;
            parse_hash_reply(reply)
        })
    }

    fn scan_summaries(&self, pattern: &str) -> StoreFuture<'_, Vec<String>> {
        let pattern = pattern.to_string();
        Box::pin(async move { self.scan(&pattern, Some("hash")).await })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let reply = self.pool.request(&RedisCommand::new("PING")).await?;
            match reply.as_str() {
                Some("PONG") => Ok(()),
                _ => Err(unexpected("PING", &reply)),
            }
        })
    }
}

fn unexpected(what: &str, reply: &RedisValue) -> KitmaxError {
    KitmaxError::protocol(format!("unexpected {} reply to {}", reply.type_name(), what))
}

fn expect_int(reply: &RedisValue) -> KitmaxResult<i64> {
    match reply {
        RedisValue::Integer(n) => Ok(*n),
        other => Err(unexpected("integer command", other)),
    }
}

fn expect_optional_string(reply: &RedisValue) -> KitmaxResult<Option<String>> {
    match reply {
        RedisValue::Null => Ok(None),
        other => other
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| unexpected("string command", other)),
    }
}

/// Decode a `JSON.GET key $.field` reply.
///
/// The reply is a JSON array of matches. No match, a `null` match, or a
/// missing key all read as absent.
pub fn parse_json_path_reply(reply: &RedisValue) -> KitmaxResult<Option<String>> {
    if reply.is_null() {
        return Ok(None);
    }
    let text = reply
        .as_str()
        .ok_or_else(|| unexpected("JSON.GET", reply))?;
    let matches: Vec<serde_json::Value> = serde_json::from_str(text)
        .map_err(|e| KitmaxError::protocol(format!("JSON.GET returned invalid JSON: {}", e)))?;
    Ok(matches
        .into_iter()
        .next()
        .filter(|value| !value.is_null())
        .map(|value| value.to_string()))
}

/// Decode a SCAN reply into the next cursor and a batch of keys.
pub fn parse_scan_reply(reply: RedisValue) -> KitmaxResult<(String, Vec<String>)> {
    let malformed = || KitmaxError::protocol("malformed SCAN reply");
    let mut parts = reply.into_array().ok_or_else(malformed)?.into_iter();
    let (Some(cursor), Some(batch), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed());
    };

    let cursor = cursor.as_str().ok_or_else(malformed)?.to_string();
    let keys = batch
        .into_array()
        .ok_or_else(malformed)?
        .iter()
        .map(|key| key.as_str().map(str::to_string).ok_or_else(malformed))
        .collect::<KitmaxResult<Vec<_>>>()?;
    Ok((cursor, keys))
}

/// Decode an HGETALL reply of alternating fields and values.
pub fn parse_hash_reply(reply: RedisValue) -> KitmaxResult<Vec<(String, String)>> {
    let items = reply
        .into_array()
        .ok_or_else(|| KitmaxError::protocol("HGETALL returned a non-array reply"))?;
    if items.len() % 2 != 0 {
        return Err(KitmaxError::protocol("HGETALL returned an odd number of items"));
    }

    items
        .chunks(2)
        .map(|pair| match (pair[0].as_str(), pair[1].as_str()) {
            (Some(field), Some(value)) => Ok((field.to_string(), value.to_string())),
            _ => Err(KitmaxError::protocol("HGETALL returned a non-string item")),
        })
        .collect()
}
