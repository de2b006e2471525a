//! Job lifecycle states and terminal outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorKind};
use crate::types::remote::VideoId;

/// Lifecycle state of an upload job.
///
/// ```text
/// pending → fetching → staged → session_open → chunk_uploading → verifying → completed
///     └──────────────┴─────────┴──────────────┴─────────────────┴──→ failed | canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted and waiting for an admission slot.
    Pending,
    /// Source bytes are being fetched into staging.
    Fetching,
    /// Source fully staged locally.
    Staged,
    /// A resumable session is open on the remote platform.
    SessionOpen,
    /// Chunks are being sent.
    ChunkUploading,
    /// The final chunk was sent; awaiting the video id.
    Verifying,
    /// The platform returned a video id.
    Completed,
    /// Terminated by a non-retryable error or an exhausted retry budget.
    Failed,
    /// Terminated by the operator.
    Canceled,
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Whether the job holds an admission slot in this state.
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != Self::Pending
    }

    /// Whether the job's staged file must be kept in this state.
    pub fn pins_staged_file(&self) -> bool {
        matches!(
            self,
            Self::Fetching
                | Self::Staged
                | Self::SessionOpen
                | Self::ChunkUploading
                | Self::Verifying
        )
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        if self.is_terminal() {
            return false;
        }
        match next {
            Failed | Canceled => true,
            Fetching => matches!(self, Pending | Fetching),
            Staged => matches!(self, Fetching | Pending),
            SessionOpen => matches!(self, Staged | ChunkUploading | SessionOpen),
            ChunkUploading => matches!(self, SessionOpen | ChunkUploading),
            Verifying => matches!(self, ChunkUploading | SessionOpen),
            Completed => *self == Verifying,
            Pending => false,
        }
    }

    /// Return the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Staged => "staged",
            Self::SessionOpen => "session_open",
            Self::ChunkUploading => "chunk_uploading",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single recorded result of a terminal job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The platform accepted the upload.
    Succeeded {
        /// Identifier of the created video.
        video_id: VideoId,
    },
    /// The job failed with exactly one error kind.
    Failed {
        /// Error kind recorded on the job.
        kind: ErrorKind,
        /// Human-readable detail.
        message: String,
    },
    /// The operator canceled the job.
    Canceled,
}

impl JobOutcome {
    /// Build the outcome for a terminal error.
    pub fn from_error(err: &AppError) -> Self {
        if err.kind == ErrorKind::Canceled {
            Self::Canceled
        } else {
            Self::Failed {
                kind: err.kind,
                message: err.message.clone(),
            }
        }
    }

    /// The terminal state this outcome corresponds to.
    pub fn state(&self) -> JobState {
        match self {
            Self::Succeeded { .. } => JobState::Completed,
            Self::Failed { .. } => JobState::Failed,
            Self::Canceled => JobState::Canceled,
        }
    }

    /// The recorded error kind, if the job did not succeed.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Succeeded { .. } => None,
            Self::Failed { kind, .. } => Some(*kind),
            Self::Canceled => Some(ErrorKind::Canceled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_accept_no_transitions() {
        for terminal in [JobState::Completed, JobState::Failed, JobState::Canceled] {
            assert!(!terminal.can_transition_to(JobState::Fetching));
            assert!(!terminal.can_transition_to(JobState::Canceled));
        }
    }

    #[test]
    fn happy_path_is_legal() {
        let path = [
            JobState::Pending,
            JobState::Fetching,
            JobState::Staged,
            JobState::SessionOpen,
            JobState::ChunkUploading,
            JobState::Verifying,
            JobState::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn session_reopen_is_legal() {
        assert!(JobState::ChunkUploading.can_transition_to(JobState::SessionOpen));
    }

    #[test]
    fn skipping_staging_is_illegal() {
        assert!(!JobState::Fetching.can_transition_to(JobState::SessionOpen));
        assert!(!JobState::Pending.can_transition_to(JobState::Completed));
    }

    #[test]
    fn canceled_error_maps_to_canceled_outcome() {
        let outcome = JobOutcome::from_error(&AppError::canceled("operator"));
        assert_eq!(outcome, JobOutcome::Canceled);
        assert_eq!(outcome.state(), JobState::Canceled);
    }
}
