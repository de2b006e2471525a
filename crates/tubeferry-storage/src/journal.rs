//! JSON job journal.
//!
//! One file per non-terminal job at `{journal_dir}/{job_id}.json`, written
//! through a temporary file and a rename so a crash never leaves a torn
//! record behind.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use tubeferry_core::error::{AppError, ErrorKind};
use tubeferry_core::result::AppResult;
use tubeferry_core::types::JobId;
use tubeferry_entity::job::JobRecord;

/// Durable snapshots of in-flight jobs.
#[derive(Debug, Clone)]
pub struct JobJournal {
    /// Directory holding one JSON file per job.
    dir: PathBuf,
}

impl JobJournal {
    /// Open the journal, creating the directory if needed.
    pub async fn new(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create journal directory: {}", dir.display()),
                e,
            )
        })?;
        Ok(Self { dir })
    }

    /// Journal directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist the latest snapshot of a job.
    pub async fn save(&self, record: &JobRecord) -> AppResult<()> {
        let job_id = record.job.id;
        let json = serde_json::to_vec_pretty(record)?;
        let tmp = self.dir.join(format!("{job_id}.json.tmp"));
        fs::write(&tmp, &json).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to write journal entry for job {job_id}"),
                e,
            )
        })?;
        fs::rename(&tmp, self.path_for(&job_id)).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to commit journal entry for job {job_id}"),
                e,
            )
        })?;
        debug!(job_id = %job_id, state = %record.job.state, "Journal entry saved");
        Ok(())
    }

    /// Read one job's snapshot.
    pub async fn load(&self, job_id: &JobId) -> AppResult<Option<JobRecord>> {
        match fs::read(self.path_for(job_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Forget a job.
    pub async fn remove(&self, job_id: &JobId) -> AppResult<()> {
        match fs::remove_file(self.path_for(job_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// All readable snapshots, oldest submission first.
    ///
    /// Unreadable entries are logged and skipped.
    pub async fn load_all(&self) -> AppResult<Vec<JobRecord>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            match serde_json::from_slice::<JobRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping corrupt journal entry"),
            }
        }
        records.sort_by_key(|r| (r.job.created_at, r.job.id));
        Ok(records)
    }

    /// Ids of every journaled job.
    pub async fn job_ids(&self) -> AppResult<Vec<JobId>> {
        Ok(self.load_all().await?.into_iter().map(|r| r.job.id).collect())
    }

    fn path_for(&self, job_id: &JobId) -> PathBuf {
        self.dir.join(format!("{job_id}.json"))
    }
}
