//! Read-only job projection returned by status queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tubeferry_core::types::{AccountId, JobId, JobOutcome, JobState, OperatorId};

use super::model::Job;

/// Status snapshot of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    /// Job identifier.
    pub id: JobId,
    /// Owning operator.
    pub operator_id: OperatorId,
    /// Remote account.
    pub account_id: AccountId,
    /// Video title.
    pub title: String,
    /// Source variant name.
    pub source_kind: String,
    /// Current state.
    pub state: JobState,
    /// Bytes acknowledged by the platform.
    pub acknowledged_bytes: u64,
    /// Total size if known.
    pub total_bytes: Option<u64>,
    /// Acknowledged percentage if the size is known.
    pub percent: Option<f64>,
    /// Transparent retries so far.
    pub retry_count: u32,
    /// Terminal result.
    pub outcome: Option<JobOutcome>,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            operator_id: job.operator_id.clone(),
            account_id: job.account_id.clone(),
            title: job.metadata.title.clone(),
            source_kind: job.source.kind().to_string(),
            state: job.state,
            acknowledged_bytes: job.acked_offset,
            total_bytes: job.total_size,
            percent: job.percent(),
            retry_count: job.retry_count,
            outcome: job.outcome.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}
