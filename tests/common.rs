//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

use bytes::{Buf, BytesMut};
use kitmax::adapters::redis::protocol::{parse_frame, ParseResult, Resp2Encoder};
use kitmax::adapters::redis::RedisValue;
use kitmax::core::config::RedisConfig;
use kitmax::events::pattern_matches;
use kitmax::pipeline::{Aggregator, Extractor, PipelineStats, ReconcileMode, RecordPipeline};
use kitmax::store::MemoryStore;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Create a minimal valid configuration file.
pub fn create_minimal_config() -> NamedTempFile {
    write_config(
        r#"
[redis]
host = "127.0.0.1"
"#,
    )
}

/// Write arbitrary configuration content to a temp file.
pub fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Build a record pipeline over a memory store.
pub fn memory_pipeline(store: &Arc<MemoryStore>, mode: ReconcileMode) -> RecordPipeline {
    RecordPipeline::new(
        Extractor::new(store.clone()),
        Aggregator::new(store.clone(), mode),
        Arc::new(PipelineStats::new()),
    )
}

/// Build a tile record document.
pub fn tile(kit: &str, state: i64, updated_at: i64) -> Value {
    serde_json::json!({ "kit": kit, "state": state, "updatedAt": updated_at })
}

/// Read a summary's two maxima as strings.
pub fn maxima(store: &MemoryStore, kit: &str) -> (Option<String>, Option<String>) {
    let summary = store.summary(&format!("kit:{}", kit)).unwrap_or_default();
    (
        summary.get("maxState").cloned(),
        summary.get("maxUpdatedAt").cloned(),
    )
}

// ============================================================================
// Fake Redis server
// ============================================================================

/// Server-side state of [`FakeRedis`].
#[derive(Default)]
pub struct FakeState {
    /// Hash keys.
    pub hashes: BTreeMap<String, BTreeMap<String, String>>,
    /// RedisJSON documents.
    pub documents: BTreeMap<String, Value>,
    /// Every command received, as strings.
    pub commands: Vec<Vec<String>>,
    /// Required password, if any.
    pub password: Option<String>,
    /// Messages pushed after a PSUBSCRIBE acknowledgement.
    pub notifications: Vec<RedisValue>,
}

/// In-process RESP2 server emulating the handful of commands kitmax uses.
pub struct FakeRedis {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeRedis {
    /// Bind to an ephemeral port and start serving.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake redis");
        let addr = listener.local_addr().expect("no local addr");
        let state = Arc::new(Mutex::new(FakeState::default()));

        let shared = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_connection(stream, shared.clone()));
            }
        });

        Self { addr, state }
    }

    /// Client configuration pointing at this server.
    pub fn config(&self) -> RedisConfig {
        RedisConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            db: 0,
            username: None,
            password: None,
            connect_timeout_ms: 1_000,
            command_timeout_ms: 1_000,
            pool_size: 2,
            notify_keyspace_events: None,
        }
    }

    /// Names of all commands received so far.
    pub fn command_names(&self) -> Vec<String> {
        self.state
            .lock()
            .commands
            .iter()
            .filter_map(|c| c.first().cloned())
            .collect()
    }
}

async fn serve_connection(mut stream: TcpStream, state: Arc<Mutex<FakeState>>) {
    let mut buffer = BytesMut::new();
    loop {
        loop {
            let (result, consumed) = parse_frame(&buffer);
            let ParseResult::Ok(value) = result else {
                break;
            };
            buffer.advance(consumed);

            let args: Vec<String> = value
                .as_array()
                .unwrap_or_default()
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            let replies = respond(&state, args);

            let mut out = Vec::new();
            for reply in &replies {
                Resp2Encoder::encode_into(reply, &mut out);
            }
            if stream.write_all(&out).await.is_err() {
                return;
            }
        }

        match stream.read_buf(&mut buffer).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

fn bulk(s: &str) -> RedisValue {
    RedisValue::bulk_string(s)
}

fn respond(state: &Mutex<FakeState>, args: Vec<String>) -> Vec<RedisValue> {
    let mut state = state.lock();
    state.commands.push(args.clone());

    let name = args.first().map(|s| s.to_uppercase()).unwrap_or_default();
    let arg = |i: usize| args.get(i).cloned().unwrap_or_default();

    let reply = match name.as_str() {
        "PING" => RedisValue::simple_string("PONG"),
        "AUTH" => {
            let given = args.last().cloned();
            if state.password.is_none() || given == state.password {
                RedisValue::ok()
            } else {
                RedisValue::error("WRONGPASS", "invalid username-password pair")
            }
        }
        "SELECT" | "CONFIG" => RedisValue::ok(),
        "HGET" => match state.hashes.get(&arg(1)).and_then(|h| h.get(&arg(2))) {
            Some(v) => bulk(v),
            None => RedisValue::Null,
        },
        "HSET" => {
            let fresh = state
                .hashes
                .entry(arg(1))
                .or_default()
                .insert(arg(2), arg(3))
                .is_none();
            RedisValue::Integer(i64::from(fresh))
        }
        "HSETNX" => {
            let hash = state.hashes.entry(arg(1)).or_default();
            if hash.contains_key(&arg(2)) {
                RedisValue::Integer(0)
            } else {
                hash.insert(arg(2), arg(3));
                RedisValue::Integer(1)
            }
        }
        "HGETALL" => RedisValue::array(
            state
                .hashes
                .get(&arg(1))
                .map(|h| {
                    h.iter()
                        .flat_map(|(f, v)| [bulk(f), bulk(v)])
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
        ),
        "JSON.GET" => match state.documents.get(&arg(1)) {
            None => RedisValue::Null,
            Some(doc) => {
                let field = arg(2).trim_start_matches("$.").to_string();
                let matches: Vec<Value> = doc.get(&field).cloned().into_iter().collect();
                bulk(&serde_json::to_string(&matches).unwrap_or_default())
            }
        },
        "SCAN" => scan(&state, &args),
        "EVAL" => eval_raise(&mut state, &args),
        "PSUBSCRIBE" => {
            let mut replies = vec![RedisValue::array(vec![
                bulk("psubscribe"),
                bulk(&arg(1)),
                RedisValue::Integer(1),
            ])];
            replies.extend(state.notifications.drain(..));
            return replies;
        }
        other => RedisValue::error("ERR", format!("unknown command '{}'", other)),
    };
    vec![reply]
}

/// Two-page SCAN so the client has to follow the cursor.
fn scan(state: &FakeState, args: &[String]) -> RedisValue {
    let cursor = args.get(1).cloned().unwrap_or_default();
    let pattern = args
        .iter()
        .position(|a| a.eq_ignore_ascii_case("MATCH"))
        .and_then(|i| args.get(i + 1))
        .cloned()
        .unwrap_or_else(|| "*".to_string());
    let hashes_only = args.iter().any(|a| a.eq_ignore_ascii_case("TYPE"));

    let mut keys: Vec<String> = if hashes_only {
        state.hashes.keys().cloned().collect()
    } else {
        state
            .documents
            .keys()
            .chain(state.hashes.keys())
            .cloned()
            .collect()
    };
    keys.retain(|k| pattern_matches(&pattern, k));

    let half = keys.len() / 2;
    let (next, page) = if cursor == "0" {
        ("7", &keys[..half])
    } else {
        ("0", &keys[half..])
    };
    RedisValue::array(vec![
        bulk(next),
        RedisValue::array(page.iter().map(|k| bulk(k)).collect()),
    ])
}

/// Emulates the raise script: validate every stored value, then raise.
fn eval_raise(state: &mut FakeState, args: &[String]) -> RedisValue {
    // EVAL <script> 1 <key> <field> <value> ...
    let Some(key) = args.get(3).cloned() else {
        return RedisValue::error("ERR", "wrong number of arguments");
    };
    let pairs: Vec<(String, i64)> = args[4..]
        .chunks(2)
        .map(|p| (p[0].clone(), p[1].parse().unwrap_or_default()))
        .collect();

    let hash = state.hashes.entry(key).or_default();
    let mut raised = Vec::new();
    for (field, incoming) in &pairs {
        let stored = match hash.get(field) {
            None => 0,
            Some(raw) => match raw.parse::<i64>() {
                Ok(n) => n,
                Err(_) => {
                    return RedisValue::error("NONNUMERIC", format!("{} {}", field, raw));
                }
            },
        };
        raised.push(*incoming > stored);
    }
    for ((field, incoming), up) in pairs.iter().zip(&raised) {
        if *up {
            hash.insert(field.clone(), incoming.to_string());
        }
    }
    RedisValue::array(
        raised
            .into_iter()
            .map(|up| RedisValue::Integer(i64::from(up)))
            .collect(),
    )
}
