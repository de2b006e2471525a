//! In-process event bus.
//!
//! Every subscriber gets its own unbounded channel, so a slow consumer
//! never blocks a job and events of one job arrive in emission order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;

use tubeferry_core::events::DomainEvent;

/// Receiving half handed to a subscriber.
pub type EventReceiver = mpsc::UnboundedReceiver<DomainEvent>;

/// Fan-out of pipeline events to any number of subscribers.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<DashMap<u64, mpsc::UnboundedSender<DomainEvent>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. Events emitted from now on are delivered.
    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, tx);
        rx
    }

    /// Deliver an event to every live subscriber.
    pub fn emit(&self, event: impl Into<DomainEvent>) {
        let event = event.into();
        let mut closed = Vec::new();
        for entry in self.subscribers.iter() {
            if entry.value().send(event.clone()).is_err() {
                closed.push(*entry.key());
            }
        }
        for id in closed {
            trace!(subscriber = id, "Dropping closed event subscriber");
            self.subscribers.remove(&id);
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
