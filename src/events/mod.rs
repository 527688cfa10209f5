//! Record-change event delivery.
//!
//! An [`EventSource`] produces [`KeyEvent`]s for changed record keys and
//! pushes them into a channel consumed by the [`dispatcher::Dispatcher`].
//!
//! Delivery guarantees depend on the source:
//!
//! | Source | Guarantee | Per-key order |
//! |--------|-----------|---------------|
//! | [`ChannelSource`] (in-memory store) | exactly once per write | preserved into the queue |
//! | [`crate::adapters::redis::KeyspaceSubscriber`] | at most once; lost while disconnected | preserved into the queue |
//!
//! The dispatcher runs handlers concurrently, so order is not preserved past
//! the queue. The atomic reconcile mode does not depend on it.

pub mod dispatcher;
pub mod pattern;

use crate::core::error::KitmaxResult;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::{mpsc, watch};

pub use dispatcher::Dispatcher;
pub use pattern::pattern_matches;

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Record was created or modified.
    Updated,
    /// Record was deleted, expired or evicted.
    Removed,
}

impl ChangeKind {
    /// Classify a Redis keyspace event name.
    pub fn from_event_name(event: &str) -> Self {
        match event {
            "del" | "unlink" | "expired" | "evicted" => Self::Removed,
            _ => Self::Updated,
        }
    }
}

/// A change notification for one record key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// The changed record key.
    pub key: String,
    /// Kind of change.
    pub kind: ChangeKind,
}

impl KeyEvent {
    /// Create an update event.
    pub fn updated(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: ChangeKind::Updated,
        }
    }

    /// Create a removal event.
    pub fn removed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: ChangeKind::Removed,
        }
    }
}

/// Future returned by [`EventSource::run`].
pub type SourceFuture = Pin<Box<dyn Future<Output = KitmaxResult<()>> + Send>>;

/// A producer of record-change events.
pub trait EventSource: Send {
    /// Source name for logging.
    fn name(&self) -> &'static str;

    /// Deliver events into `sink` until shutdown, or until the source or the
    /// sink is exhausted.
    fn run(self: Box<Self>, sink: mpsc::Sender<KeyEvent>, shutdown: watch::Receiver<bool>)
        -> SourceFuture;
}

/// Event source forwarding from an in-process channel.
pub struct ChannelSource {
    events: mpsc::UnboundedReceiver<KeyEvent>,
}

impl ChannelSource {
    /// Wrap a receiver, e.g. one returned by `MemoryStore::subscribe`.
    pub fn new(events: mpsc::UnboundedReceiver<KeyEvent>) -> Self {
        Self { events }
    }
}

impl EventSource for ChannelSource {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn run(
        mut self: Box<Self>,
        sink: mpsc::Sender<KeyEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SourceFuture {
        Box::pin(async move {
            loop {
                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => return Ok(()),
                    event = self.events.recv() => {
                        let Some(event) = event else {
                            return Ok(());
                        };
                        if sink.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        })
    }
}

/// Resolve once the shutdown flag is raised or its sender is dropped.
pub(crate) async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            // Sender gone: nobody can request shutdown any more, so park.
            std::future::pending::<()>().await;
        }
    }
}
