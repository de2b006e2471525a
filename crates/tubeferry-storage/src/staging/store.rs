//! Local staging store.
//!
//! Every job gets one append-only file under the staging directory. While
//! bytes are being written the file is named `{job_id}.part`; sealing
//! renames it to `{job_id}.bin` and records its SHA-256. A single byte
//! ledger, guarded by one mutex, tracks reservations of all files against
//! the global quota.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tubeferry_core::error::{AppError, ErrorKind};
use tubeferry_core::result::AppResult;
use tubeferry_core::types::{JobId, SizeHint};
use tubeferry_entity::staging::StagedFile;

use super::checksum::file_checksum;

const PARTIAL_EXT: &str = "part";
const SEALED_EXT: &str = "bin";

/// Byte reservations per job.
#[derive(Debug, Default)]
struct QuotaLedger {
    /// Sum of all reservations.
    used: u64,
    /// Bytes reserved by each staged job.
    reserved: HashMap<JobId, u64>,
}

impl QuotaLedger {
    fn release(&mut self, job_id: &JobId) -> u64 {
        let freed = self.reserved.remove(job_id).unwrap_or(0);
        self.used = self.used.saturating_sub(freed);
        freed
    }
}

/// Exclusive write handle for one job's staged file.
///
/// Not `Clone`: holding the handle is what makes a writer the only writer.
#[derive(Debug)]
pub struct StagingHandle {
    /// Entity describing the file being written.
    staged: StagedFile,
    /// Open file, positioned at the end.
    file: fs::File,
    /// Running digest of everything written.
    hasher: Sha256,
    /// Bytes currently reserved in the ledger for this handle.
    reserved: u64,
    /// Set once the file was purged after a failed write.
    purged: bool,
}

impl StagingHandle {
    /// The job this handle writes for.
    pub fn job_id(&self) -> JobId {
        self.staged.job_id
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.staged.written
    }

    /// Snapshot of the staged file entity.
    pub fn staged(&self) -> &StagedFile {
        &self.staged
    }
}

/// Quota-tracked scratch storage.
#[derive(Debug)]
pub struct StagingStore {
    /// Directory holding all staged files.
    root: PathBuf,
    /// Global byte budget.
    quota_bytes: u64,
    /// Reservations, mutated only under this lock.
    ledger: Mutex<QuotaLedger>,
}

impl StagingStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>, quota_bytes: u64) -> AppResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create staging root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self {
            root,
            quota_bytes,
            ledger: Mutex::new(QuotaLedger::default()),
        })
    }

    /// Staging directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configured global quota.
    pub fn quota_bytes(&self) -> u64 {
        self.quota_bytes
    }

    /// Bytes currently reserved across all staged files.
    pub async fn used_bytes(&self) -> u64 {
        self.ledger.lock().await.used
    }

    /// Whether `job_id` currently owns a staged file.
    pub async fn is_staged(&self, job_id: &JobId) -> bool {
        self.ledger.lock().await.reserved.contains_key(job_id)
    }

    /// Start a staged file for `job_id`.
    ///
    /// Reserves the hinted size up front. Fails with `QuotaExceeded` if the
    /// reservation would breach the quota and with `Conflict` if the job
    /// already has a staged file.
    pub async fn begin(&self, job_id: JobId, hint: SizeHint) -> AppResult<StagingHandle> {
        let reserve = hint.exact().unwrap_or(0);
        {
            let mut ledger = self.ledger.lock().await;
            if ledger.reserved.contains_key(&job_id) {
                return Err(AppError::conflict(format!(
                    "job {job_id} already has a staged file"
                )));
            }
            if ledger.used.saturating_add(reserve) > self.quota_bytes {
                return Err(AppError::quota_exceeded(format!(
                    "staging {reserve} bytes would exceed the quota ({} of {} in use)",
                    ledger.used, self.quota_bytes
                )));
            }
            ledger.used += reserve;
            ledger.reserved.insert(job_id, reserve);
        }

        let path = self.path_for(&job_id, false);
        let file = match fs::File::create(&path).await {
            Ok(file) => file,
            Err(e) => {
                self.ledger.lock().await.release(&job_id);
                return Err(AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create staged file: {}", path.display()),
                    e,
                ));
            }
        };

        debug!(job_id = %job_id, reserved = reserve, "Staged file opened");
        Ok(StagingHandle {
            staged: StagedFile::new(job_id, path, hint),
            file,
            hasher: Sha256::new(),
            reserved: reserve,
            purged: false,
        })
    }

    /// Append `data`, returning the new end offset.
    ///
    /// Growing past the reservation takes more quota. If that would breach
    /// the quota the partial file is purged and `QuotaExceeded` returned.
    pub async fn write(&self, handle: &mut StagingHandle, data: &[u8]) -> AppResult<u64> {
        if handle.purged {
            return Err(AppError::storage(format!(
                "staged file for job {} was purged",
                handle.job_id()
            )));
        }
        if handle.staged.sealed {
            return Err(AppError::conflict(format!(
                "staged file for job {} is sealed",
                handle.job_id()
            )));
        }

        let new_end = handle.staged.written + data.len() as u64;
        if new_end > handle.reserved {
            let extra = new_end - handle.reserved;
            let mut ledger = self.ledger.lock().await;
            if ledger.used.saturating_add(extra) > self.quota_bytes {
                ledger.release(&handle.job_id());
                drop(ledger);
                handle.purged = true;
                remove_if_exists(&handle.staged.path).await?;
                warn!(
                    job_id = %handle.job_id(),
                    written = handle.staged.written,
                    "Staging quota exhausted; partial file purged"
                );
                return Err(AppError::quota_exceeded(format!(
                    "staged file for job {} outgrew the remaining quota",
                    handle.job_id()
                )));
            }
            ledger.used += extra;
            if let Some(r) = ledger.reserved.get_mut(&handle.job_id()) {
                *r += extra;
            }
            handle.reserved = new_end;
        }

        handle.file.write_all(data).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to write staged bytes", e)
        })?;
        handle.hasher.update(data);
        handle.staged.written = new_end;
        Ok(new_end)
    }

    /// Seal the file and return its final description.
    ///
    /// Unused reservation is returned to the quota.
    pub async fn finalize(&self, mut handle: StagingHandle) -> AppResult<StagedFile> {
        if handle.purged {
            return Err(AppError::storage(format!(
                "staged file for job {} was purged",
                handle.job_id()
            )));
        }
        handle
            .file
            .flush()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Storage, "Failed to flush file", e))?;
        handle
            .file
            .sync_all()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Storage, "Failed to sync file", e))?;

        let job_id = handle.job_id();
        let written = handle.staged.written;
        {
            let mut ledger = self.ledger.lock().await;
            if let Some(r) = ledger.reserved.get_mut(&job_id) {
                let excess = r.saturating_sub(written);
                *r = written;
                ledger.used = ledger.used.saturating_sub(excess);
            }
        }

        let sealed_path = self.path_for(&job_id, true);
        drop(handle.file);
        fs::rename(&handle.staged.path, &sealed_path)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to seal staged file for job {job_id}"),
                    e,
                )
            })?;

        let mut staged = handle.staged;
        staged.path = sealed_path;
        staged.sha256 = Some(hex::encode(handle.hasher.finalize()));
        staged.sealed = true;

        info!(job_id = %job_id, size = written, "Staged file sealed");
        Ok(staged)
    }

    /// Delete a job's staged file and free its reservation.
    ///
    /// Idempotent: releasing a job with nothing staged is not an error.
    pub async fn release(&self, job_id: &JobId) -> AppResult<()> {
        let freed = self.ledger.lock().await.release(job_id);
        remove_if_exists(&self.path_for(job_id, false)).await?;
        remove_if_exists(&self.path_for(job_id, true)).await?;
        debug!(job_id = %job_id, freed, "Staged file released");
        Ok(())
    }

    /// Drop an unfinished handle and delete its partial file.
    pub async fn abort(&self, handle: StagingHandle) -> AppResult<()> {
        let job_id = handle.job_id();
        drop(handle.file);
        self.release(&job_id).await
    }

    /// Re-register a sealed file left by a previous process.
    ///
    /// Fails with `NotFound` if the file is gone or its size changed.
    pub async fn adopt(&self, staged: &StagedFile) -> AppResult<()> {
        if !staged.sealed {
            return Err(AppError::validation("only sealed files can be adopted"));
        }
        let meta = match fs::metadata(&staged.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::not_found(format!(
                    "staged file missing: {}",
                    staged.path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        if meta.len() != staged.written {
            return Err(AppError::not_found(format!(
                "staged file {} has {} bytes, expected {}",
                staged.path.display(),
                meta.len(),
                staged.written
            )));
        }

        let mut ledger = self.ledger.lock().await;
        if ledger.reserved.contains_key(&staged.job_id) {
            return Err(AppError::conflict(format!(
                "job {} already has a staged file",
                staged.job_id
            )));
        }
        if ledger.used.saturating_add(staged.written) > self.quota_bytes {
            return Err(AppError::quota_exceeded(
                "adopting staged file would exceed the quota",
            ));
        }
        ledger.used += staged.written;
        ledger.reserved.insert(staged.job_id, staged.written);
        Ok(())
    }

    /// Re-hash a sealed file and compare with its recorded digest.
    pub async fn verify(&self, staged: &StagedFile) -> AppResult<()> {
        let Some(expected) = staged.sha256.as_deref() else {
            return Err(AppError::storage(format!(
                "staged file for job {} has no checksum",
                staged.job_id
            )));
        };
        let actual = file_checksum(&staged.path).await?;
        if actual != expected {
            return Err(AppError::storage(format!(
                "checksum mismatch for job {}: expected {expected}, got {actual}",
                staged.job_id
            )));
        }
        Ok(())
    }

    /// All files in the staging directory, with the job id parsed from the name.
    ///
    /// Files whose name is not a job id are returned with `None`.
    pub async fn list_files(&self) -> AppResult<Vec<(Option<JobId>, PathBuf)>> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            let job_id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<JobId>().ok());
            files.push((job_id, path));
        }
        Ok(files)
    }

    fn path_for(&self, job_id: &JobId, sealed: bool) -> PathBuf {
        let ext = if sealed { SEALED_EXT } else { PARTIAL_EXT };
        self.root.join(format!("{job_id}.{ext}"))
    }
}

async fn remove_if_exists(path: &Path) -> AppResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::with_source(
            ErrorKind::Storage,
            format!("Failed to delete staged file: {}", path.display()),
            e,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(quota: u64) -> (tempfile::TempDir, StagingStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StagingStore::new(dir.path().join("staging"), quota)
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn writes_are_appended_and_sealed_with_checksum() {
        let (_dir, store) = store(1024).await;
        let job = JobId::new();
        let mut handle = store.begin(job, SizeHint::Exact(6)).await.unwrap();
        assert_eq!(store.write(&mut handle, b"abc").await.unwrap(), 3);
        assert_eq!(store.write(&mut handle, b"def").await.unwrap(), 6);

        let staged = store.finalize(handle).await.unwrap();
        assert!(staged.sealed);
        assert_eq!(staged.written, 6);
        assert_eq!(tokio::fs::read(&staged.path).await.unwrap(), b"abcdef");
        assert_eq!(
            staged.sha256.as_deref(),
            Some("bef57ec7f53a6d40beb640a780a639c83bc29ac8a9816f1fc6c5c6dcd93c4721")
        );
        store.verify(&staged).await.unwrap();
    }

    #[tokio::test]
    async fn begin_rejects_hint_over_quota() {
        let (_dir, store) = store(100).await;
        let _held = store.begin(JobId::new(), SizeHint::Exact(60)).await.unwrap();
        let err = store
            .begin(JobId::new(), SizeHint::Exact(50))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::QuotaExceeded);
        assert_eq!(store.used_bytes().await, 60);
    }

    #[tokio::test]
    async fn unknown_length_stream_is_purged_when_it_outgrows_quota() {
        let (_dir, store) = store(10).await;
        let job = JobId::new();
        let mut handle = store.begin(job, SizeHint::Unknown).await.unwrap();
        store.write(&mut handle, &[0u8; 8]).await.unwrap();
        let path = handle.staged().path.clone();

        let err = store.write(&mut handle, &[0u8; 8]).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::QuotaExceeded);
        assert!(!path.exists());
        assert_eq!(store.used_bytes().await, 0);
        assert!(!store.is_staged(&job).await);
        assert!(store.write(&mut handle, b"x").await.is_err());
    }

    #[tokio::test]
    async fn second_writer_for_same_job_conflicts() {
        let (_dir, store) = store(100).await;
        let job = JobId::new();
        let _first = store.begin(job, SizeHint::Unknown).await.unwrap();
        let err = store.begin(job, SizeHint::Unknown).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn finalize_returns_unused_reservation() {
        let (_dir, store) = store(100).await;
        let mut handle = store.begin(JobId::new(), SizeHint::Exact(50)).await.unwrap();
        store.write(&mut handle, &[1u8; 20]).await.unwrap();
        store.finalize(handle).await.unwrap();
        assert_eq!(store.used_bytes().await, 20);
    }

    #[tokio::test]
    async fn release_deletes_file_and_is_idempotent() {
        let (_dir, store) = store(100).await;
        let job = JobId::new();
        let mut handle = store.begin(job, SizeHint::Unknown).await.unwrap();
        store.write(&mut handle, b"abc").await.unwrap();
        let staged = store.finalize(handle).await.unwrap();

        store.release(&job).await.unwrap();
        assert!(!staged.path.exists());
        assert_eq!(store.used_bytes().await, 0);
        store.release(&job).await.unwrap();
    }

    #[tokio::test]
    async fn adopt_reregisters_sealed_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("staging");
        let job = JobId::new();
        let staged = {
            let store = StagingStore::new(&root, 100).await.unwrap();
            let mut handle = store.begin(job, SizeHint::Unknown).await.unwrap();
            store.write(&mut handle, b"hello").await.unwrap();
            store.finalize(handle).await.unwrap()
        };

        let restarted = StagingStore::new(&root, 100).await.unwrap();
        restarted.adopt(&staged).await.unwrap();
        assert_eq!(restarted.used_bytes().await, 5);
        assert!(restarted.is_staged(&job).await);
    }

    #[tokio::test]
    async fn verify_detects_tampering() {
        let (_dir, store) = store(100).await;
        let mut handle = store.begin(JobId::new(), SizeHint::Unknown).await.unwrap();
        store.write(&mut handle, b"original").await.unwrap();
        let staged = store.finalize(handle).await.unwrap();
        tokio::fs::write(&staged.path, b"tampered").await.unwrap();

        let err = store.verify(&staged).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Storage);
    }
}
