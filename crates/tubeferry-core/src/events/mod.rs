//! Events emitted by the upload pipeline.
//!
//! Events are delivered through the pipeline's event bus in emission
//! order per job and consumed by the progress reporter and any other
//! subscriber (the chat front end, audit logging).

pub mod account;
pub mod job;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use account::AccountEvent;
pub use job::{JobEvent, TransferPhase};

/// Wrapper for all pipeline events with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Unique event ID.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// The event payload.
    pub payload: EventPayload,
}

/// Union of all event types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event")]
pub enum EventPayload {
    /// A job-related event.
    Job(JobEvent),
    /// An account-related event.
    Account(AccountEvent),
}

impl DomainEvent {
    /// Create a new event stamped with the current time.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Return the job event, if this is one.
    pub fn as_job(&self) -> Option<&JobEvent> {
        match &self.payload {
            EventPayload::Job(event) => Some(event),
            EventPayload::Account(_) => None,
        }
    }
}

impl From<JobEvent> for DomainEvent {
    fn from(event: JobEvent) -> Self {
        Self::new(EventPayload::Job(event))
    }
}

impl From<AccountEvent> for DomainEvent {
    fn from(event: AccountEvent) -> Self {
        Self::new(EventPayload::Account(event))
    }
}
