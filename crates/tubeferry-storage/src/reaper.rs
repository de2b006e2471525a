//! Orphan staged-file cleanup.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use tubeferry_core::result::AppResult;

use crate::journal::JobJournal;
use crate::staging::StagingStore;

/// Deletes staged files whose job is no longer journaled.
#[derive(Debug, Clone)]
pub struct OrphanReaper {
    /// Store whose directory is scanned.
    store: Arc<StagingStore>,
    /// Source of truth for live jobs.
    journal: Arc<JobJournal>,
}

impl OrphanReaper {
    /// Create a new reaper.
    pub fn new(store: Arc<StagingStore>, journal: Arc<JobJournal>) -> Self {
        Self { store, journal }
    }

    /// Remove every orphaned file and return the deleted paths.
    ///
    /// A file is kept while its job is journaled or currently staged in
    /// this process. Files whose name is not a job id are left alone.
    pub async fn reap(&self) -> AppResult<Vec<PathBuf>> {
        let live: HashSet<_> = self.journal.job_ids().await?.into_iter().collect();
        let mut removed = Vec::new();

        for (job_id, path) in self.store.list_files().await? {
            let Some(job_id) = job_id else {
                warn!(path = %path.display(), "Ignoring unrecognized file in staging directory");
                continue;
            };
            if live.contains(&job_id) || self.store.is_staged(&job_id).await {
                continue;
            }
            tokio::fs::remove_file(&path).await?;
            info!(job_id = %job_id, path = %path.display(), "Reaped orphaned staged file");
            removed.push(path);
        }

        Ok(removed)
    }
}
