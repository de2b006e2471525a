//! Job runner — drives one admitted job from fetch to terminal state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tubeferry_core::error::{AppError, ErrorKind};
use tubeferry_core::events::{AccountEvent, JobEvent, TransferPhase};
use tubeferry_core::result::AppResult;
use tubeferry_core::types::{AccountId, JobId, JobOutcome, JobState, VideoId};
use tubeferry_entity::job::{JobRecord, SourceDescriptor};
use tubeferry_entity::staging::StagedFile;
use tubeferry_upload::{UploadObserver, UploadRequest, UploadStep};

use crate::pipeline::Shared;
use crate::queue::Admission;

/// Run an admitted job to completion and give its slot back.
pub(crate) async fn run_job(shared: Arc<Shared>, admission: Admission) {
    let job_id = admission.job_id;
    let runner = JobRunner {
        shared: &shared,
        job_id,
        account_id: admission.record.job.account_id.clone(),
        cancel: admission.cancel,
    };

    let result = runner.execute(admission.record).await;
    runner.conclude(result).await;

    shared.queue.release(&job_id).await;
    shared.wake.notify_one();
}

struct JobRunner<'a> {
    shared: &'a Shared,
    job_id: JobId,
    account_id: AccountId,
    cancel: CancellationToken,
}

impl JobRunner<'_> {
    async fn execute(&self, record: JobRecord) -> AppResult<VideoId> {
        let staged = match record.staged.clone().filter(|s| s.sealed) {
            Some(staged) => {
                info!(job_id = %self.job_id, "Reusing staged file from previous run");
                staged
            }
            None => self.fetch(&record.job.source).await?,
        };
        self.transition(JobState::Staged).await?;

        if self.shared.config.staging.verify_checksum {
            self.shared.staging.verify(&staged).await?;
        }
        self.check_cancel()?;

        let observer = JobObserver { runner: self };
        self.shared
            .uploads
            .upload(
                UploadRequest {
                    job_id: self.job_id,
                    account_id: &self.account_id,
                    metadata: &record.job.metadata,
                    staged: &staged,
                    saved_session: record.session.clone(),
                    cancel: &self.cancel,
                },
                &observer,
            )
            .await
    }

    /// Fetch the source into staging, restarting on transient failures.
    async fn fetch(&self, source: &SourceDescriptor) -> AppResult<StagedFile> {
        self.transition(JobState::Fetching).await?;
        let attempts = self.shared.config.source.fetch_attempts.max(1);
        let mut attempt = 1;
        loop {
            self.check_cancel()?;
            match self.fetch_once(source).await {
                Ok(staged) => return Ok(staged),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(job_id = %self.job_id, attempt, error = %e, "Fetch failed; restarting");
                    self.record_retry(attempt, &e.message).await?;
                    self.pause(self.shared.fetch_backoff.delay(attempt)).await?;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    return Err(AppError::source_unreachable(format!(
                        "source still failing after {attempts} attempts: {}",
                        e.message
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, source: &SourceDescriptor) -> AppResult<StagedFile> {
        let mut stream = self.shared.fetcher.open(source).await?;
        let hint = stream.size();
        if let Some(size) = hint.exact() {
            self.shared
                .queue
                .update(&self.job_id, |r| r.job.set_total_size(size))
                .await?;
        }

        let staging = &self.shared.staging;
        let mut handle = staging.begin(self.job_id, hint).await?;
        let step = self.shared.config.upload.chunk_size_bytes.max(1);
        let mut next_report = step;

        loop {
            if self.cancel.is_cancelled() {
                staging.abort(handle).await?;
                return Err(AppError::canceled("job canceled while fetching"));
            }
            let chunk = match stream.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    staging.abort(handle).await?;
                    return Err(e);
                }
            };
            let written = match staging.write(&mut handle, &chunk).await {
                Ok(written) => written,
                Err(e) => {
                    staging.abort(handle).await?;
                    return Err(e);
                }
            };
            if written >= next_report {
                self.shared.bus.emit(JobEvent::Progress {
                    job_id: self.job_id,
                    phase: TransferPhase::Fetch,
                    bytes: written,
                    total: hint.exact(),
                });
                next_report = written + step;
            }
        }

        let staged = staging.finalize(handle).await?;
        let size = staged.written;
        let sealed = staged.clone();
        self.shared
            .queue
            .update(&self.job_id, move |r| {
                r.job.set_total_size(size);
                r.staged = Some(sealed);
                r.session = None;
            })
            .await?;
        self.shared.bus.emit(JobEvent::Progress {
            job_id: self.job_id,
            phase: TransferPhase::Fetch,
            bytes: size,
            total: Some(size),
        });
        info!(job_id = %self.job_id, size, "Source staged");
        Ok(staged)
    }

    /// Record the terminal outcome, or keep the journal entry on shutdown.
    async fn conclude(&self, result: AppResult<VideoId>) {
        let interrupted = matches!(&result, Err(e) if e.kind == ErrorKind::Canceled)
            && self.shared.shutdown.is_cancelled()
            && !self.shared.queue.is_cancel_requested(&self.job_id).await;
        if interrupted {
            info!(job_id = %self.job_id, "Job interrupted by shutdown; kept for recovery");
            self.persist().await;
            return;
        }

        let outcome = match result {
            Ok(video_id) => JobOutcome::Succeeded { video_id },
            Err(e) => {
                if e.kind == ErrorKind::CredentialRevoked {
                    self.hold_account(&e).await;
                }
                JobOutcome::from_error(&e)
            }
        };
        self.shared.finish(self.job_id, outcome).await;
    }

    async fn hold_account(&self, err: &AppError) {
        if self.shared.queue.hold_account(&self.account_id).await {
            warn!(
                account_id = %self.account_id,
                "Account revoked; its queued jobs are held until re-authorization"
            );
            self.shared.bus.emit(AccountEvent::Revoked {
                account_id: self.account_id.clone(),
                reason: err.message.clone(),
            });
        }
    }

    async fn transition(&self, next: JobState) -> AppResult<()> {
        let from = self
            .shared
            .queue
            .update(&self.job_id, |r| r.job.transition(next))
            .await??;
        if from != next {
            info!(job_id = %self.job_id, from = %from, to = %next, "Job state changed");
            self.shared.bus.emit(JobEvent::StateChanged {
                job_id: self.job_id,
                from,
                to: next,
            });
            self.persist().await;
        }
        Ok(())
    }

    async fn record_retry(&self, attempt: u32, reason: &str) -> AppResult<()> {
        self.shared
            .queue
            .update(&self.job_id, |r| r.job.record_retry())
            .await?;
        self.shared.bus.emit(JobEvent::Retrying {
            job_id: self.job_id,
            attempt,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Write the current record to the journal.
    async fn persist(&self) {
        let Some(record) = self.shared.queue.record(&self.job_id).await else {
            return;
        };
        if let Err(e) = self.shared.journal.save(&record).await {
            warn!(job_id = %self.job_id, error = %e, "Failed to journal job");
        }
    }

    fn check_cancel(&self) -> AppResult<()> {
        if self.cancel.is_cancelled() {
            return Err(AppError::canceled("job canceled"));
        }
        Ok(())
    }

    async fn pause(&self, delay: Duration) -> AppResult<()> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = self.cancel.cancelled() => Err(AppError::canceled("job canceled during backoff")),
        }
    }
}

/// Mirrors upload steps into the job record, the event bus and the journal.
struct JobObserver<'a> {
    runner: &'a JobRunner<'a>,
}

#[async_trait]
impl UploadObserver for JobObserver<'_> {
    async fn on_step(&self, step: UploadStep<'_>) -> AppResult<()> {
        let runner = self.runner;
        match step {
            UploadStep::SessionOpened { session, reopened } => {
                let snapshot = session.clone();
                runner
                    .shared
                    .queue
                    .update(&runner.job_id, move |r| {
                        r.job.acknowledge(snapshot.bytes_acked);
                        r.session = Some(snapshot);
                    })
                    .await?;
                if reopened {
                    info!(job_id = %runner.job_id, offset = session.bytes_acked, "Upload session re-opened");
                }
                runner.transition(JobState::SessionOpen).await?;
                runner.persist().await;
                Ok(())
            }
            UploadStep::ChunkSending { .. } => runner.transition(JobState::ChunkUploading).await,
            UploadStep::Acknowledged { session } => {
                let snapshot = session.clone();
                let acked = session.bytes_acked;
                let total = session.total_size();
                runner
                    .shared
                    .queue
                    .update(&runner.job_id, move |r| {
                        r.job.acknowledge(acked);
                        r.session = Some(snapshot);
                    })
                    .await?;
                runner.shared.bus.emit(JobEvent::Progress {
                    job_id: runner.job_id,
                    phase: TransferPhase::Upload,
                    bytes: acked,
                    total: Some(total),
                });
                runner.persist().await;
                Ok(())
            }
            UploadStep::Retrying { attempt, reason } => runner.record_retry(attempt, reason).await,
            UploadStep::Verifying => runner.transition(JobState::Verifying).await,
        }
    }
}
