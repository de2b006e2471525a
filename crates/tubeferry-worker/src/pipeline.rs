//! The upload pipeline facade: submission, cancellation, status, events,
//! recovery and shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use tubeferry_auth::{CredentialManager, GoogleOAuthClient};
use tubeferry_core::config::AppConfig;
use tubeferry_core::error::{AppError, ErrorKind};
use tubeferry_core::events::{AccountEvent, JobEvent};
use tubeferry_core::result::AppResult;
use tubeferry_core::traits::{AttachmentResolver, OAuthAuthority, VideoPlatform};
use tubeferry_core::types::{AccountId, JobId, JobOutcome, JobState};
use tubeferry_entity::job::{Job, JobRecord, JobRequest, JobView};
use tubeferry_source::{SourceFetcher, TelegramAttachmentResolver};
use tubeferry_storage::{JobJournal, OrphanReaper, StagingStore};
use tubeferry_upload::{Backoff, UploadSessionManager, YouTubeClient};

use crate::bus::{EventBus, EventReceiver};
use crate::queue::{AdmissionQueue, CancelOutcome, QueueStats};
use crate::runner;

/// How [`UploadPipeline::shutdown`] treats running jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Let running jobs finish.
    Drain,
    /// Stop running jobs at their next checkpoint and keep them journaled.
    Persist,
}

/// External systems the pipeline talks to.
#[derive(Debug, Clone)]
pub struct Collaborators {
    /// Video platform receiving uploads.
    pub platform: Arc<dyn VideoPlatform>,
    /// OAuth token authority.
    pub authority: Arc<dyn OAuthAuthority>,
    /// Chat attachment resolver, if chat attachments are supported.
    pub attachments: Option<Arc<dyn AttachmentResolver>>,
}

/// State shared by the facade, the dispatcher and every job runner.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) config: AppConfig,
    pub(crate) queue: AdmissionQueue,
    pub(crate) bus: EventBus,
    pub(crate) fetcher: SourceFetcher,
    pub(crate) staging: Arc<StagingStore>,
    pub(crate) journal: Arc<JobJournal>,
    pub(crate) credentials: CredentialManager,
    pub(crate) uploads: UploadSessionManager,
    pub(crate) fetch_backoff: Backoff,
    /// Parent of every job's cancellation token; cancelled by a persisting shutdown.
    pub(crate) shutdown: CancellationToken,
    /// Stops the dispatcher.
    pub(crate) closing: CancellationToken,
    /// Wakes the dispatcher when a slot or a job becomes available.
    pub(crate) wake: Notify,
    pub(crate) tracker: TaskTracker,
}

impl Shared {
    /// Record a terminal outcome for a job that is still running.
    ///
    /// The staged file and journal entry are gone by the time waiters see
    /// the terminal state.
    pub(crate) async fn finish(&self, job_id: JobId, outcome: JobOutcome) {
        self.cleanup(&job_id).await;
        let finished = self
            .queue
            .update(&job_id, |r| {
                let from = r.job.finish(outcome.clone())?;
                self.announce(job_id, from, &outcome);
                Ok::<_, AppError>(from)
            })
            .await;
        if let Err(e) = finished.and_then(|r| r) {
            error!(job_id = %job_id, error = %e, "Failed to record job outcome");
        }
    }

    /// Side effects of a waiting job being canceled in the queue.
    pub(crate) async fn settle(&self, job_id: JobId, from: JobState, outcome: JobOutcome) {
        self.announce(job_id, from, &outcome);
        self.cleanup(&job_id).await;
    }

    fn announce(&self, job_id: JobId, from: JobState, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Succeeded { video_id } => {
                info!(job_id = %job_id, video_id = %video_id, "Job completed");
            }
            JobOutcome::Failed { kind, message } => {
                error!(job_id = %job_id, kind = %kind, error = %message, "Job failed");
            }
            JobOutcome::Canceled => warn!(job_id = %job_id, "Job canceled"),
        }
        self.bus.emit(JobEvent::StateChanged {
            job_id,
            from,
            to: outcome.state(),
        });
        self.bus.emit(JobEvent::Finished {
            job_id,
            outcome: outcome.clone(),
        });
    }

    async fn cleanup(&self, job_id: &JobId) {
        if let Err(e) = self.staging.release(job_id).await {
            warn!(job_id = %job_id, error = %e, "Failed to release staged file");
        }
        if let Err(e) = self.journal.remove(job_id).await {
            warn!(job_id = %job_id, error = %e, "Failed to remove journal entry");
        }
    }
}

/// Admits jobs whenever a slot frees up, until the pipeline closes.
async fn dispatch(shared: Arc<Shared>) {
    loop {
        while let Some(admission) = shared.queue.admit().await {
            shared
                .tracker
                .spawn(runner::run_job(Arc::clone(&shared), admission));
        }
        tokio::select! {
            _ = shared.closing.cancelled() => break,
            _ = shared.wake.notified() => {}
        }
    }
    debug!("Dispatcher stopped");
}

/// Upload pipeline: the submission API and event stream.
///
/// Cloning is cheap; every clone drives the same queue.
#[derive(Debug, Clone)]
pub struct UploadPipeline {
    shared: Arc<Shared>,
}

impl UploadPipeline {
    /// Build a pipeline around the given collaborators and start dispatching.
    ///
    /// `config` is expected to have passed [`AppConfig::validate`].
    pub async fn new(config: AppConfig, collaborators: Collaborators) -> AppResult<Self> {
        let staging = Arc::new(
            StagingStore::new(config.staging.staging_dir(), config.staging.quota_bytes).await?,
        );
        let journal = Arc::new(JobJournal::new(config.staging.journal_dir()).await?);
        let credentials = CredentialManager::from_config(collaborators.authority, &config.oauth);
        let fetcher = SourceFetcher::new(config.source.clone(), collaborators.attachments)?;
        let uploads = UploadSessionManager::new(
            collaborators.platform,
            credentials.clone(),
            config.upload.clone(),
        );
        let shutdown = CancellationToken::new();

        let shared = Arc::new(Shared {
            queue: AdmissionQueue::new(&config.queue, shutdown.clone()),
            bus: EventBus::new(),
            fetcher,
            staging,
            journal,
            credentials,
            uploads,
            fetch_backoff: Backoff::from_config(&config.upload),
            shutdown,
            closing: CancellationToken::new(),
            wake: Notify::new(),
            tracker: TaskTracker::new(),
            config,
        });
        tokio::spawn(dispatch(Arc::clone(&shared)));

        info!(
            global = shared.config.queue.global_concurrency,
            per_operator = shared.config.queue.per_operator_concurrency,
            accounts = shared.credentials.accounts().len(),
            "Upload pipeline started"
        );
        Ok(Self { shared })
    }

    /// Build a pipeline talking to YouTube, Google OAuth and Telegram.
    pub async fn from_config(config: AppConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(
                config.source.connect_timeout_seconds,
            ))
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Configuration, "failed to build HTTP client", e)
            })?;
        let attachments = TelegramAttachmentResolver::from_config(http.clone(), &config.chat)
            .map(|r| Arc::new(r) as Arc<dyn AttachmentResolver>);
        let collaborators = Collaborators {
            platform: Arc::new(YouTubeClient::new(&config.upload)?),
            authority: Arc::new(GoogleOAuthClient::new(http, &config.oauth)),
            attachments,
        };
        Self::new(config, collaborators).await
    }

    /// Accept one job. Returns its id once it is queued.
    ///
    /// Errors: `Authorization` for operators outside the allow-list,
    /// `Validation` for bad metadata, `NotFound` for unknown accounts,
    /// `Conflict` once shutdown has begun.
    pub async fn submit(&self, request: JobRequest) -> AppResult<JobId> {
        let record = self.prepare(request)?;
        self.accept(record).await
    }

    /// Accept several jobs, queued in the given order.
    ///
    /// Every request is validated before any is queued.
    pub async fn submit_bulk(&self, requests: Vec<JobRequest>) -> AppResult<Vec<JobId>> {
        let records = requests
            .into_iter()
            .map(|r| self.prepare(r))
            .collect::<AppResult<Vec<_>>>()?;
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            ids.push(self.accept(record).await?);
        }
        info!(count = ids.len(), "Bulk submission queued");
        Ok(ids)
    }

    /// Cancel a job. Waiting jobs are canceled immediately; running jobs
    /// stop at their next checkpoint.
    pub async fn cancel(&self, job_id: &JobId) -> AppResult<()> {
        match self.shared.queue.cancel(job_id).await? {
            CancelOutcome::Dequeued { from } => {
                self.shared.settle(*job_id, from, JobOutcome::Canceled).await;
            }
            CancelOutcome::Signalled => {
                info!(job_id = %job_id, "Cancellation requested for running job");
            }
        }
        Ok(())
    }

    /// Current view of a job.
    pub async fn status(&self, job_id: &JobId) -> AppResult<JobView> {
        self.shared
            .queue
            .view(job_id)
            .await
            .ok_or_else(|| AppError::not_found(format!("job {job_id} not found")))
    }

    /// Views of every job seen by this process, in submission order.
    pub async fn jobs(&self) -> Vec<JobView> {
        self.shared.queue.views().await
    }

    /// Queue counters.
    pub async fn stats(&self) -> QueueStats {
        self.shared.queue.stats().await
    }

    /// Subscribe to job and account events.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.bus.subscribe()
    }

    /// Wait until the job is terminal and return its final view.
    pub async fn wait(&self, job_id: &JobId) -> AppResult<JobView> {
        self.shared.queue.wait_terminal(job_id).await
    }

    /// Install a new refresh token for an account and release its held jobs.
    pub async fn reauthorize(&self, account_id: &AccountId, refresh_token: &str) -> AppResult<()> {
        self.shared
            .credentials
            .reauthorize(account_id, refresh_token)
            .await?;
        self.shared.queue.release_account(account_id).await;
        self.shared.bus.emit(AccountEvent::Reauthorized {
            account_id: account_id.clone(),
        });
        info!(account_id = %account_id, "Account re-authorized");
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Requeue every unfinished job from the journal.
    ///
    /// Jobs whose staged file survived skip fetching and resume their saved
    /// upload session; the rest start over from the source.
    pub async fn recover(&self) -> AppResult<Vec<JobId>> {
        let shared = &self.shared;
        let mut resumed = Vec::new();
        for mut record in shared.journal.load_all().await? {
            let job_id = record.job.id;
            if record.job.state.is_terminal() {
                shared.journal.remove(&job_id).await?;
                continue;
            }
            if shared.queue.record(&job_id).await.is_some() {
                continue;
            }

            if let Some(staged) = record.staged.clone() {
                let reusable = staged.sealed
                    && match shared.staging.adopt(&staged).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(job_id = %job_id, error = %e, "Staged file unusable; refetching");
                            false
                        }
                    };
                if !reusable {
                    shared.staging.release(&job_id).await?;
                    record.staged = None;
                    record.session = None;
                }
            }

            record.job.requeue();
            debug!(
                job_id = %job_id,
                staged = record.has_sealed_file(),
                acknowledged = record.job.acked_offset,
                "Recovering job"
            );
            self.accept(record).await?;
            resumed.push(job_id);
        }
        info!(count = resumed.len(), "Recovered journaled jobs");
        Ok(resumed)
    }

    /// Delete staged files that no journaled or running job owns.
    pub async fn reap(&self) -> AppResult<Vec<PathBuf>> {
        OrphanReaper::new(
            Arc::clone(&self.shared.staging),
            Arc::clone(&self.shared.journal),
        )
        .reap()
        .await
    }

    /// Stop accepting and admitting jobs, then wait for running jobs.
    ///
    /// Waiting jobs stay in the journal for [`recover`](Self::recover).
    pub async fn shutdown(&self, mode: ShutdownMode) {
        let shared = &self.shared;
        info!(?mode, active = shared.queue.stats().await.active, "Shutting down upload pipeline");
        shared.queue.close().await;
        if mode == ShutdownMode::Persist {
            shared.shutdown.cancel();
        }
        shared.closing.cancel();
        shared.tracker.close();
        shared.tracker.wait().await;
        info!("Upload pipeline stopped");
    }

    fn prepare(&self, request: JobRequest) -> AppResult<JobRecord> {
        let shared = &self.shared;
        if shared.closing.is_cancelled() {
            return Err(AppError::conflict("pipeline is shutting down"));
        }
        if !shared.config.queue.is_allowed(request.operator_id.as_str()) {
            return Err(AppError::authorization(format!(
                "operator {} is not allowed to submit uploads",
                request.operator_id
            )));
        }
        request.metadata.validate()?;
        if !shared.credentials.contains(&request.account_id) {
            return Err(AppError::not_found(format!(
                "account {} is not authorized",
                request.account_id
            )));
        }
        Ok(JobRecord::new(Job::new(request)))
    }

    async fn accept(&self, record: JobRecord) -> AppResult<JobId> {
        let shared = &self.shared;
        shared.journal.save(&record).await?;
        let operator_id = record.job.operator_id.clone();
        let title = record.job.metadata.title.clone();
        let job_id = shared.queue.enqueue(record).await?;

        info!(job_id = %job_id, operator_id = %operator_id, title = %title, "Job submitted");
        shared.bus.emit(JobEvent::Submitted {
            job_id,
            operator_id,
            title,
        });
        shared.wake.notify_one();
        Ok(job_id)
    }
}
