//! Job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tubeferry_core::types::{AccountId, JobId, JobOutcome, JobState, OperatorId, VideoMetadata};
use tubeferry_core::{AppError, AppResult};

use super::source::SourceDescriptor;

/// Data required to create a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    /// Operator submitting the job.
    pub operator_id: OperatorId,
    /// Remote account the video is uploaded under.
    pub account_id: AccountId,
    /// Where the bytes come from.
    pub source: SourceDescriptor,
    /// Destination metadata.
    pub metadata: VideoMetadata,
}

/// One upload request, owned by the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Owning operator.
    pub operator_id: OperatorId,
    /// Remote account the upload is authorized under.
    pub account_id: AccountId,
    /// Where the bytes come from.
    pub source: SourceDescriptor,
    /// Destination metadata.
    pub metadata: VideoMetadata,
    /// Declared or discovered total size.
    pub total_size: Option<u64>,
    /// Current lifecycle state.
    pub state: JobState,
    /// Bytes the platform has acknowledged; never decreases.
    pub acked_offset: u64,
    /// Transparent retries performed (fetch restarts and chunk resends).
    pub retry_count: u32,
    /// Terminal result, set exactly when the state is terminal.
    pub outcome: Option<JobOutcome>,
    /// When the job was submitted.
    pub created_at: DateTime<Utc>,
    /// When the job last changed.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a pending job from a request.
    pub fn new(request: JobRequest) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            operator_id: request.operator_id,
            account_id: request.account_id,
            source: request.source,
            metadata: request.metadata,
            total_size: None,
            state: JobState::Pending,
            acked_offset: 0,
            retry_count: 0,
            outcome: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, returning the previous state.
    ///
    /// Terminal states must be entered through [`Job::finish`] so that the
    /// outcome is always recorded with them.
    pub fn transition(&mut self, next: JobState) -> AppResult<JobState> {
        if next.is_terminal() {
            return Err(AppError::internal(format!(
                "job {} must be finished with an outcome, not moved to {next}",
                self.id
            )));
        }
        if !self.state.can_transition_to(next) {
            return Err(AppError::conflict(format!(
                "job {}: illegal transition {} -> {next}",
                self.id, self.state
            )));
        }
        let previous = self.state;
        self.state = next;
        self.updated_at = Utc::now();
        Ok(previous)
    }

    /// Record the terminal outcome, returning the previous state.
    pub fn finish(&mut self, outcome: JobOutcome) -> AppResult<JobState> {
        let next = outcome.state();
        if !self.state.can_transition_to(next) {
            return Err(AppError::conflict(format!(
                "job {} is already {}",
                self.id, self.state
            )));
        }
        if let JobOutcome::Succeeded { .. } = outcome {
            if let Some(total) = self.total_size {
                self.acknowledge(total);
            }
        }
        let previous = self.state;
        self.state = next;
        self.outcome = Some(outcome);
        self.updated_at = Utc::now();
        Ok(previous)
    }

    /// Raise the acknowledged offset. Lower values are ignored.
    ///
    /// Returns whether the offset moved.
    pub fn acknowledge(&mut self, offset: u64) -> bool {
        if offset > self.acked_offset {
            self.acked_offset = offset;
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }

    /// Record the size once it becomes known.
    pub fn set_total_size(&mut self, size: u64) {
        self.total_size = Some(size);
        self.updated_at = Utc::now();
    }

    /// Count one transparent retry.
    pub fn record_retry(&mut self) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.updated_at = Utc::now();
    }

    /// Put an interrupted job back in the queue after a restart.
    ///
    /// Progress counters are kept; terminal jobs are left untouched.
    pub fn requeue(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = JobState::Pending;
        self.updated_at = Utc::now();
        true
    }

    /// Acknowledged share of the total, 0-100, if the size is known.
    pub fn percent(&self) -> Option<f64> {
        match self.total_size {
            Some(0) => Some(100.0),
            Some(total) => Some((self.acked_offset as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubeferry_core::ErrorKind;
    use tubeferry_core::types::VideoId;

    fn job() -> Job {
        Job::new(JobRequest {
            operator_id: "alice".into(),
            account_id: "acct".into(),
            source: SourceDescriptor::Url {
                url: "https://example.com/v.mp4".into(),
            },
            metadata: VideoMetadata::titled("clip"),
        })
    }

    #[test]
    fn new_job_is_pending_without_outcome() {
        let job = job();
        assert_eq!(job.state, JobState::Pending);
        assert!(job.outcome.is_none());
        assert_eq!(job.percent(), None);
    }

    #[test]
    fn acknowledged_offset_never_decreases() {
        let mut job = job();
        assert!(job.acknowledge(100));
        assert!(!job.acknowledge(40));
        assert_eq!(job.acked_offset, 100);
    }

    #[test]
    fn illegal_transition_is_conflict() {
        let mut job = job();
        let err = job.transition(JobState::ChunkUploading).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(job.state, JobState::Pending);
    }

    #[test]
    fn terminal_states_require_finish() {
        let mut job = job();
        assert!(job.transition(JobState::Failed).is_err());
        job.finish(JobOutcome::Canceled).unwrap();
        assert_eq!(job.state, JobState::Canceled);
        assert!(job.finish(JobOutcome::Canceled).is_err());
    }

    #[test]
    fn requeue_keeps_progress_but_not_terminal_jobs() {
        let mut job = job();
        job.transition(JobState::Fetching).unwrap();
        job.acknowledge(64);
        assert!(job.requeue());
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.acked_offset, 64);

        job.finish(JobOutcome::Canceled).unwrap();
        assert!(!job.requeue());
        assert_eq!(job.state, JobState::Canceled);
    }

    #[test]
    fn success_pins_offset_to_total() {
        let mut job = job();
        job.set_total_size(1000);
        for state in [
            JobState::Fetching,
            JobState::Staged,
            JobState::SessionOpen,
            JobState::ChunkUploading,
            JobState::Verifying,
        ] {
            job.transition(state).unwrap();
        }
        job.acknowledge(900);
        job.finish(JobOutcome::Succeeded {
            video_id: VideoId::from("v1"),
        })
        .unwrap();
        assert_eq!(job.acked_offset, 1000);
        assert_eq!(job.percent(), Some(100.0));
    }
}
