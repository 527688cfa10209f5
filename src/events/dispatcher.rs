//! Event dispatcher.
//!
//! Pulls [`KeyEvent`]s off the source queue and runs the registered
//! [`EventHandler`] for each one, with at most `max_in_flight` invocations
//! running at once. Handler failures are logged and counted; they never stop
//! the dispatcher.

use super::{wait_for_shutdown, ChangeKind, KeyEvent};
use crate::pipeline::handler::EventHandler;
use crate::pipeline::stats::PipelineStats;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;

/// Dispatches record-change events to a handler.
pub struct Dispatcher {
    handler: Arc<dyn EventHandler>,
    stats: Arc<PipelineStats>,
    max_in_flight: usize,
    ignore_removals: bool,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(
        handler: Arc<dyn EventHandler>,
        stats: Arc<PipelineStats>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            handler,
            stats,
            max_in_flight: max_in_flight.max(1),
            ignore_removals: true,
        }
    }

    /// Set whether removal events are skipped.
    pub fn with_ignore_removals(mut self, ignore: bool) -> Self {
        self.ignore_removals = ignore;
        self
    }

    /// Run until the queue closes or shutdown is requested, then wait for
    /// in-flight handlers to finish.
    pub async fn run(&self, mut events: mpsc::Receiver<KeyEvent>, mut shutdown: watch::Receiver<bool>) {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    tracing::debug!("dispatcher shutting down");
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    Self::reap(joined);
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("event queue closed");
                        break;
                    };
                    if !self.admit(&event) {
                        continue;
                    }
                    let permit = match permits.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    let handler = Arc::clone(&self.handler);
                    tasks.spawn(async move {
                        let result = handler.handle(&event.key).await;
                        drop(permit);
                        if let Err(ref e) = result {
                            tracing::warn!(key = %event.key, error = %e, "record change processing failed");
                        }
                    });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            Self::reap(joined);
        }
    }

    /// Count an incoming event and decide whether it should be handled.
    fn admit(&self, event: &KeyEvent) -> bool {
        self.stats.record_received();
        if self.ignore_removals && event.kind == ChangeKind::Removed {
            tracing::trace!(key = %event.key, "skipping removal event");
            self.stats.record_skipped();
            return false;
        }
        true
    }

    fn reap(joined: Result<(), tokio::task::JoinError>) {
        if let Err(e) = joined {
            tracing::error!(error = %e, "event handler task panicked");
        }
    }
}
