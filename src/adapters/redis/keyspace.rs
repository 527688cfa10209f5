//! Keyspace notification subscriber.
//!
//! Subscribes to `__keyspace@<db>__:<pattern>` on a dedicated connection and
//! turns each notification into a [`KeyEvent`]. Redis pub/sub is fire and
//! forget: notifications published while the subscriber is disconnected are
//! lost, and a backfill is the only way to recover them.

use super::client::RespConnection;
use super::{RedisCommand, RedisValue};
use crate::core::config::{RedisConfig, SubscriberConfig};
use crate::core::error::{KitmaxError, KitmaxResult};
use crate::events::{wait_for_shutdown, ChangeKind, EventSource, KeyEvent, SourceFuture};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// A decoded message from the subscription connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The server confirmed the pattern subscription.
    Subscribed,
    /// A record changed.
    Event(KeyEvent),
    /// Anything else.
    Ignored,
}

/// [`EventSource`] backed by Redis keyspace notifications.
pub struct KeyspaceSubscriber {
    redis: RedisConfig,
    record_pattern: String,
    backoff_initial: Duration,
    backoff_max: Duration,
    subscribed: Option<watch::Sender<bool>>,
}

impl KeyspaceSubscriber {
    /// Create a subscriber for record keys matching `record_pattern`.
    pub fn new(redis: RedisConfig, record_pattern: &str, subscriber: &SubscriberConfig) -> Self {
        Self {
            redis,
            record_pattern: record_pattern.to_string(),
            backoff_initial: Duration::from_millis(subscriber.reconnect_backoff_ms),
            backoff_max: Duration::from_millis(subscriber.reconnect_backoff_max_ms),
            subscribed: None,
        }
    }

    /// Set `signal` to `true` on every subscription ack.
    pub fn with_subscribed_signal(mut self, signal: watch::Sender<bool>) -> Self {
        self.subscribed = Some(signal);
        self
    }

    fn channel_prefix(&self) -> String {
        format!("__keyspace@{}__:", self.redis.db)
    }

    /// Pattern passed to PSUBSCRIBE.
    pub fn channel_pattern(&self) -> String {
        format!("{}{}", self.channel_prefix(), self.record_pattern)
    }

    /// Decode one message received on the subscription connection.
    ///
    /// Keyspace `pmessage`s look like
    /// `["pmessage", <pattern>, "__keyspace@0__:<key>", <event>]`.
    pub fn parse_notification(&self, value: &RedisValue) -> Notification {
        let Some(parts) = value.as_array() else {
            return Notification::Ignored;
        };

        match parts {
            [kind, ..] if kind.as_str() == Some("psubscribe") => Notification::Subscribed,
            [kind, _pattern, channel, event] if kind.as_str() == Some("pmessage") => {
                let prefix = self.channel_prefix();
                let key = channel.as_str().and_then(|c| c.strip_prefix(prefix.as_str()));
                match (key, event.as_str()) {
                    (Some(key), Some(event)) => Notification::Event(KeyEvent {
                        key: key.to_string(),
                        kind: ChangeKind::from_event_name(event),
                    }),
                    _ => Notification::Ignored,
                }
            }
            _ => Notification::Ignored,
        }
    }

    /// One connection lifetime. Returns `Ok` only when the sink is closed.
    async fn session(
        &self,
        sink: &mpsc::Sender<KeyEvent>,
        backoff: &mut Duration,
    ) -> KitmaxResult<()> {
        let mut conn = RespConnection::connect(&self.redis).await?;
        let pattern = self.channel_pattern();
        conn.send(&RedisCommand::new("PSUBSCRIBE").arg(&pattern))
            .await?;

        loop {
            let value = conn.read_value().await?;
            if let RedisValue::Error(e) = value {
                return Err(KitmaxError::StoreRejected {
                    kind: e.kind,
                    message: e.message,
                });
            }

            match self.parse_notification(&value) {
                Notification::Subscribed => {
                    tracing::info!(pattern = %pattern, "subscribed to keyspace notifications");
                    *backoff = self.backoff_initial;
                    if let Some(ref signal) = self.subscribed {
                        signal.send_replace(true);
                    }
                }
                Notification::Event(event) => {
                    tracing::trace!(key = %event.key, kind = ?event.kind, "keyspace event");
                    if sink.send(event).await.is_err() {
                        return Ok(());
                    }
                }
                Notification::Ignored => {
                    tracing::trace!(reply = ?value, "ignoring subscription message");
                }
            }
        }
    }
}

impl EventSource for KeyspaceSubscriber {
    fn name(&self) -> &'static str {
        "redis-keyspace"
    }

    fn run(
        self: Box<Self>,
        sink: mpsc::Sender<KeyEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SourceFuture {
        Box::pin(async move {
            let mut backoff = self.backoff_initial;
            loop {
                let outcome = tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => return Ok(()),
                    outcome = self.session(&sink, &mut backoff) => outcome,
                };

                match outcome {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            retry_in_ms = backoff.as_millis() as u64,
                            "keyspace subscription lost, notifications missed until reconnect"
                        );
                    }
                }

                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => return Ok(()),
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(self.backoff_max);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber(db: u32) -> KeyspaceSubscriber {
        let redis = RedisConfig {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db,
            username: None,
            password: None,
            connect_timeout_ms: 100,
            command_timeout_ms: 100,
            pool_size: 1,
            notify_keyspace_events: None,
        };
        KeyspaceSubscriber::new(redis, "tile:*", &SubscriberConfig::default())
    }

    fn pmessage(channel: &str, event: &str) -> RedisValue {
        RedisValue::array(vec![
            RedisValue::bulk_string("pmessage"),
            RedisValue::bulk_string("__keyspace@0__:tile:*"),
            RedisValue::bulk_string(channel),
            RedisValue::bulk_string(event),
        ])
    }

    #[test]
    fn test_channel_pattern() {
        assert_eq!(subscriber(0).channel_pattern(), "__keyspace@0__:tile:*");
        assert_eq!(subscriber(3).channel_pattern(), "__keyspace@3__:tile:*");
    }

    #[test]
    fn test_parse_notifications() {
        let sub = subscriber(0);

        assert_eq!(
            sub.parse_notification(&pmessage("__keyspace@0__:tile:4/2/9", "json.set")),
            Notification::Event(KeyEvent::updated("tile:4/2/9"))
        );
        assert_eq!(
            sub.parse_notification(&pmessage("__keyspace@0__:tile:4/2/9", "expired")),
            Notification::Event(KeyEvent::removed("tile:4/2/9"))
        );
        assert_eq!(
            sub.parse_notification(&pmessage("__keyspace@1__:tile:1", "json.set")),
            Notification::Ignored
        );

        let ack = RedisValue::array(vec![
            RedisValue::bulk_string("psubscribe"),
            RedisValue::bulk_string("__keyspace@0__:tile:*"),
            RedisValue::Integer(1),
        ]);
        assert_eq!(sub.parse_notification(&ack), Notification::Subscribed);
        assert_eq!(sub.parse_notification(&RedisValue::ok()), Notification::Ignored);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_while_disconnected() {
        let mut sub = subscriber(0);
        sub.redis.port = 1;
        let (sink, _events) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(Box::new(sub).run(sink, shutdown_rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }
}
