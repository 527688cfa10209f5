//! RESP2 client connections.
//!
//! [`RespConnection`] is one authenticated TCP connection speaking
//! request/response RESP2. [`ConnectionPool`] bounds how many of them are in
//! use at once and recycles healthy ones.

use super::protocol::{parse_frame, ParseResult, Resp2Encoder};
use super::{RedisCommand, RedisValue};
use crate::core::config::RedisConfig;
use crate::core::error::{KitmaxError, KitmaxResult};
use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;

/// Initial read buffer capacity.
const READ_BUFFER_CAPACITY: usize = 16 * 1024;

/// A single RESP2 connection.
pub struct RespConnection {
    stream: TcpStream,
    buffer: BytesMut,
    command_timeout: Duration,
}

impl RespConnection {
    /// Connect, authenticate and select the configured database.
    pub async fn connect(config: &RedisConfig) -> KitmaxResult<Self> {
        let address = config.address();
        let stream = tokio::time::timeout(config.connect_timeout(), TcpStream::connect(&address))
            .await
            .map_err(|_| {
                KitmaxError::unavailable(format!(
                    "connect to {} timed out after {}ms",
                    address, config.connect_timeout_ms
                ))
            })?
            .map_err(|e| KitmaxError::unavailable(format!("connect to {}: {}", address, e)))?;
        stream.set_nodelay(true)?;

        let mut conn = Self {
            stream,
            buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            command_timeout: config.command_timeout(),
        };

        if let Some(ref password) = config.password {
            let mut auth = RedisCommand::new("AUTH");
            if let Some(ref username) = config.username {
                auth = auth.arg(username);
            }
            conn.request(&auth.arg(password)).await?;
        }
        if config.db != 0 {
            conn.request(&RedisCommand::new("SELECT").arg_int(i64::from(config.db)))
                .await?;
        }

        tracing::debug!(address = %address, db = config.db, "redis connection established");
        Ok(conn)
    }

    /// Send a command and wait for its reply.
    ///
    /// Error replies become `StoreRejected`; exceeding the command timeout
    /// becomes `StoreUnavailable`.
    pub async fn request(&mut self, command: &RedisCommand) -> KitmaxResult<RedisValue> {
        let timeout = self.command_timeout;
        let reply = tokio::time::timeout(timeout, self.round_trip(command))
            .await
            .map_err(|_| {
                KitmaxError::unavailable(format!(
                    "{} timed out after {}ms",
                    command.name,
                    timeout.as_millis()
                ))
            })??;

        match reply {
            RedisValue::Error(e) => Err(KitmaxError::StoreRejected {
                kind: e.kind,
                message: e.message,
            }),
            value => Ok(value),
        }
    }

    /// Write a command without waiting for a reply.
    pub async fn send(&mut self, command: &RedisCommand) -> KitmaxResult<()> {
        let bytes = Resp2Encoder::encode(&command.to_value());
        self.stream.write_all(&bytes).await?;
        Ok(())
    }

    /// Read the next complete value off the connection.
    ///
    /// Waits indefinitely; used directly by subscribers, which receive
    /// unsolicited pushes.
    pub async fn read_value(&mut self) -> KitmaxResult<RedisValue> {
        loop {
            if !self.buffer.is_empty() {
                let (result, consumed) = parse_frame(&self.buffer);
                match result {
                    ParseResult::Ok(value) => {
                        self.buffer.advance(consumed);
                        return Ok(value);
                    }
                    ParseResult::Incomplete => {}
                    ParseResult::Error(e) => return Err(KitmaxError::protocol(e)),
                }
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(KitmaxError::unavailable("connection closed by server"));
            }
        }
    }

    async fn round_trip(&mut self, command: &RedisCommand) -> KitmaxResult<RedisValue> {
        self.send(command).await?;
        self.read_value().await
    }
}

/// Bounded pool of [`RespConnection`]s.
///
/// Connections are opened lazily. A connection that failed with anything
/// other than an error reply is dropped instead of being returned.
pub struct ConnectionPool {
    config: RedisConfig,
    idle: Mutex<Vec<RespConnection>>,
    permits: Semaphore,
}

impl ConnectionPool {
    /// Create a pool for `config`. No connection is opened yet.
    pub fn new(config: RedisConfig) -> Self {
        let permits = Semaphore::new(config.pool_size.max(1));
        Self {
            config,
            idle: Mutex::new(Vec::new()),
            permits,
        }
    }

    /// Get the connection configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Number of idle connections held.
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().len()
    }

    /// Run one command on a pooled connection.
    pub async fn request(&self, command: &RedisCommand) -> KitmaxResult<RedisValue> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| KitmaxError::unavailable("connection pool closed"))?;

        let idle = self.idle.lock().pop();
        let mut conn = match idle {
            Some(conn) => conn,
            None => RespConnection::connect(&self.config).await?,
        };

        let result = conn.request(command).await;
        match result {
            Ok(_) | Err(KitmaxError::StoreRejected { .. }) => self.idle.lock().push(conn),
            Err(ref e) => {
                tracing::debug!(command = %command.name, error = %e, "discarding redis connection");
            }
        }
        result
    }
}
