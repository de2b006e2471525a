//! Staged file model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tubeferry_core::types::{JobId, SizeHint};

/// Local copy of a job's source bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedFile {
    /// Owning job.
    pub job_id: JobId,
    /// Location on disk.
    pub path: PathBuf,
    /// Size announced by the source, if any.
    pub expected_size: Option<u64>,
    /// Bytes appended so far.
    pub written: u64,
    /// Hex SHA-256 of the content, set when sealed.
    pub sha256: Option<String>,
    /// Whether the file is complete and immutable.
    pub sealed: bool,
}

impl StagedFile {
    /// Describe a new, empty staged file.
    pub fn new(job_id: JobId, path: PathBuf, hint: SizeHint) -> Self {
        Self {
            job_id,
            path,
            expected_size: hint.exact(),
            written: 0,
            sha256: None,
            sealed: false,
        }
    }

    /// Final size once sealed, otherwise the expected size.
    pub fn size(&self) -> Option<u64> {
        if self.sealed {
            Some(self.written)
        } else {
            self.expected_size
        }
    }
}
