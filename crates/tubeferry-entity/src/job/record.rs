//! Journal record for restart recovery.

use serde::{Deserialize, Serialize};

use super::model::Job;
use crate::session::UploadSession;
use crate::staging::StagedFile;

/// Everything needed to resume a job after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// The job itself.
    pub job: Job,
    /// The last open upload session, if one was opened.
    #[serde(default)]
    pub session: Option<UploadSession>,
    /// Location of the staged bytes, if fetching started.
    #[serde(default)]
    pub staged: Option<StagedFile>,
}

impl JobRecord {
    /// Record for a job that has not fetched anything yet.
    pub fn new(job: Job) -> Self {
        Self {
            job,
            session: None,
            staged: None,
        }
    }

    /// Whether the staged bytes are complete and can be uploaded directly.
    pub fn has_sealed_file(&self) -> bool {
        self.staged.as_ref().is_some_and(|s| s.sealed)
    }
}
