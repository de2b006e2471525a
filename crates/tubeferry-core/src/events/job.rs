//! Job-related events.

use serde::{Deserialize, Serialize};

use crate::types::id::{JobId, OperatorId};
use crate::types::state::{JobOutcome, JobState};

/// Which transfer a progress tick refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferPhase {
    /// Source → staging.
    Fetch,
    /// Staging → remote platform.
    Upload,
}

/// Events related to a single job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// The job was accepted into the queue.
    Submitted {
        /// The job ID.
        job_id: JobId,
        /// The submitting operator.
        operator_id: OperatorId,
        /// Video title, for display.
        title: String,
    },
    /// The job moved between lifecycle states.
    StateChanged {
        /// The job ID.
        job_id: JobId,
        /// Previous state.
        from: JobState,
        /// New state.
        to: JobState,
    },
    /// Bytes moved during a transfer.
    Progress {
        /// The job ID.
        job_id: JobId,
        /// Which transfer advanced.
        phase: TransferPhase,
        /// Bytes fetched, or bytes acknowledged by the platform.
        bytes: u64,
        /// Total size if known.
        total: Option<u64>,
    },
    /// A chunk or fetch attempt failed and will be retried.
    Retrying {
        /// The job ID.
        job_id: JobId,
        /// Attempt number that failed (1-based).
        attempt: u32,
        /// Failure detail.
        reason: String,
    },
    /// The job reached a terminal state.
    Finished {
        /// The job ID.
        job_id: JobId,
        /// The recorded outcome.
        outcome: JobOutcome,
    },
}

impl JobEvent {
    /// The job this event belongs to.
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Submitted { job_id, .. }
            | Self::StateChanged { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Finished { job_id, .. } => *job_id,
        }
    }
}
