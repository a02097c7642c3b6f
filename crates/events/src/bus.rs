//! In-process fan-out of run events to live observers (CLI feed, monitor).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::broadcast::{self, Receiver, Sender};
use tokio_stream::wrappers::BroadcastStream;

use crate::types::EventEnvelope;

/// Envelopes an observer may fall behind by before it starts losing the
/// oldest ones.
pub const DEFAULT_BACKLOG: usize = 1024;

/// Cloneable handle to one run feed. Clones share the channel and counter.
///
/// Delivery is best effort. The run log on disk is the record of a run; a
/// slow observer only loses its view, never the run's history.
#[derive(Clone)]
pub struct EventBus {
    tx: Sender<EventEnvelope>,
    total: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_backlog(DEFAULT_BACKLOG)
    }

    pub fn with_backlog(backlog: usize) -> Self {
        let (tx, _initial_rx) = broadcast::channel(backlog.max(1));
        Self {
            tx,
            total: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Hand `envelope` to every attached observer and return how many there
    /// were. Publishing into a feed nobody watches is not an error.
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.total.fetch_add(1, Ordering::Relaxed);
        match self.tx.send(envelope) {
            Ok(observers) => observers,
            Err(_nobody_listening) => 0,
        }
    }

    /// Attach a raw receiver. It sees only envelopes published after this call.
    pub fn subscribe(&self) -> Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Attach as a stream. Lag gaps are skipped rather than surfaced.
    pub fn stream(&self) -> impl Stream<Item = EventEnvelope> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|item| async move { item.ok() })
    }

    pub fn observers(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Envelopes published over the feed's lifetime, watched or not.
    pub fn published(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers())
            .field("published", &self.published())
            .finish()
    }
}
