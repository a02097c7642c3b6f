//! Single entry point for run events.
//!
//! Each event is stamped with the run's next sequence number, written to the
//! run log, then fanned out on the live bus. Observers therefore never see an
//! event the log does not have.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use events::{Event, EventBus, EventEnvelope};
use sowcrew_core::RunId;

use crate::run_logger::RunLogger;

/// Cloneable; all clones draw from one counter so `seq` stays contiguous
/// across concurrently running tasks.
#[derive(Clone)]
pub struct EventEmitter {
    run_id: RunId,
    bus: EventBus,
    logger: RunLogger,
    next_seq: Arc<AtomicU64>,
}

impl EventEmitter {
    pub fn new(run_id: RunId, bus: EventBus, logger: RunLogger) -> Self {
        Self {
            run_id,
            bus,
            logger,
            next_seq: Arc::default(),
        }
    }

    pub fn emit(&self, event: Event) -> EventEnvelope {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope::new(self.run_id.clone(), seq, event);
        self.logger.record(&envelope);
        self.bus.publish(envelope.clone());
        envelope
    }

    pub fn emitted(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}
