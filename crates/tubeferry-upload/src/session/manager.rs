//! Upload session manager — the resumable transfer state machine.
//!
//! ```text
//! establish ──► chunk loop ──────────────────────────────► video id
//!   │  fresh session, or saved session + received query      ▲
//!   │                                                        │
//!   │   transient failure: same chunk again with backoff ────┤
//!   │   attempts exhausted: query received range, resume ────┤
//!   │   auth rejected: refresh once, resend ─────────────────┤
//!   └── session gone: open a new one, query received range ──┘
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tubeferry_auth::CredentialManager;
use tubeferry_core::config::upload::UploadConfig;
use tubeferry_core::error::{AppError, ErrorKind};
use tubeferry_core::result::AppResult;
use tubeferry_core::traits::platform::VideoPlatform;
use tubeferry_core::types::{
    AccessToken, AccountId, ChunkResponse, JobId, RemoteProgress, VideoId, VideoMetadata,
};
use tubeferry_entity::session::UploadSession;
use tubeferry_entity::staging::StagedFile;

use super::backoff::Backoff;
use super::observer::{UploadObserver, UploadStep};
use super::reader::ChunkReader;

/// Everything the manager needs to upload one job.
#[derive(Debug)]
pub struct UploadRequest<'a> {
    /// Job being uploaded.
    pub job_id: JobId,
    /// Account the upload is authorized under.
    pub account_id: &'a AccountId,
    /// Destination metadata.
    pub metadata: &'a VideoMetadata,
    /// Sealed staged bytes.
    pub staged: &'a StagedFile,
    /// Session saved by a previous run, if any.
    pub saved_session: Option<UploadSession>,
    /// Checked between chunks and during backoff.
    pub cancel: &'a CancellationToken,
}

/// Result of establishing a session.
enum Established {
    /// Ready to send from the session's acknowledged offset.
    Session(UploadSession),
    /// The platform already holds the complete upload.
    Done(VideoId),
}

/// Runs resumable uploads against a [`VideoPlatform`].
#[derive(Clone)]
pub struct UploadSessionManager {
    /// Remote platform.
    platform: Arc<dyn VideoPlatform>,
    /// Token source.
    credentials: CredentialManager,
    /// Chunking and retry settings.
    config: UploadConfig,
    /// Delay schedule between attempts.
    backoff: Backoff,
    /// Active sessions, keyed by job.
    sessions: Arc<DashMap<JobId, UploadSession>>,
}

impl std::fmt::Debug for UploadSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSessionManager")
            .field("platform", &self.platform.name())
            .field("chunk_size", &self.config.chunk_size_bytes)
            .field("active_sessions", &self.sessions.len())
            .finish()
    }
}

impl UploadSessionManager {
    /// Create a manager.
    pub fn new(
        platform: Arc<dyn VideoPlatform>,
        credentials: CredentialManager,
        config: UploadConfig,
    ) -> Self {
        let backoff = Backoff::from_config(&config);
        Self {
            platform,
            credentials,
            config,
            backoff,
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Snapshot of a job's active session.
    pub fn session(&self, job_id: &JobId) -> Option<UploadSession> {
        self.sessions.get(job_id).map(|s| s.value().clone())
    }

    /// Number of sessions currently in use.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Upload the staged file, returning the created video's id.
    ///
    /// Errors carry the job's terminal kind: `Canceled`, `AuthExpired`,
    /// `CredentialRevoked`, `SessionExpiredUnrecoverable`,
    /// `NetworkTransient` once every retry and resume is spent, or
    /// `PlatformRejected`.
    pub async fn upload(
        &self,
        req: UploadRequest<'_>,
        observer: &dyn UploadObserver,
    ) -> AppResult<VideoId> {
        let result = self.run(&req, observer).await;
        self.sessions.remove(&req.job_id);
        match &result {
            Ok(video_id) => info!(job_id = %req.job_id, video_id = %video_id, "Upload completed"),
            Err(e) => warn!(job_id = %req.job_id, error = %e, "Upload stopped"),
        }
        result
    }

    async fn run(&self, req: &UploadRequest<'_>, observer: &dyn UploadObserver) -> AppResult<VideoId> {
        if !req.staged.sealed {
            return Err(AppError::internal("upload requires a sealed staged file"));
        }
        let digest = req
            .staged
            .sha256
            .clone()
            .ok_or_else(|| AppError::storage("staged file has no checksum"))?;
        let total = req.staged.written;
        if total == 0 {
            return Err(AppError::validation("source is empty"));
        }
        let mut reader = ChunkReader::open(&req.staged.path, total).await?;

        match self.establish(req, total, &digest, observer).await? {
            Established::Done(video_id) => {
                observer.on_step(UploadStep::Verifying).await?;
                Ok(video_id)
            }
            Established::Session(mut session) => {
                self.chunk_loop(req, &mut session, &mut reader, observer).await
            }
        }
    }

    /// Resume the saved session if it still matches, otherwise open a new one.
    async fn establish(
        &self,
        req: &UploadRequest<'_>,
        total: u64,
        digest: &str,
        observer: &dyn UploadObserver,
    ) -> AppResult<Established> {
        let saved = req
            .saved_session
            .clone()
            .filter(|s| s.total_size() == total && s.content_digest == digest);

        let Some(mut session) = saved else {
            return self.open_fresh(req, total, digest, observer).await;
        };

        info!(
            job_id = %req.job_id,
            acknowledged = session.bytes_acked,
            "Resuming saved upload session"
        );
        session.chunk_size = self.config.chunk_size_bytes;
        if session.is_expired_at(Utc::now()) {
            return self.reopen(req, session, observer).await;
        }

        match self.query(req, &session, observer).await {
            Ok(RemoteProgress::Complete(video_id)) => {
                self.already_complete(req, session, video_id, false, observer)
                    .await
            }
            Ok(RemoteProgress::Partial(received)) => {
                if received < session.bytes_acked {
                    return Err(AppError::session_expired(format!(
                        "platform reports {received} bytes, {} were acknowledged",
                        session.bytes_acked
                    )));
                }
                session.acknowledge(received);
                self.track(&session);
                observer
                    .on_step(UploadStep::SessionOpened {
                        session: &session,
                        reopened: false,
                    })
                    .await?;
                Ok(Established::Session(session))
            }
            Err(e) if e.kind == ErrorKind::SessionExpiredUnrecoverable => {
                self.reopen(req, session, observer).await
            }
            Err(e) => Err(e),
        }
    }

    async fn open_fresh(
        &self,
        req: &UploadRequest<'_>,
        total: u64,
        digest: &str,
        observer: &dyn UploadObserver,
    ) -> AppResult<Established> {
        let remote = self.create_remote(req, total, digest, observer).await?;
        let session = UploadSession::new(
            req.job_id,
            remote,
            self.config.chunk_size_bytes,
            digest.to_string(),
        );
        info!(job_id = %req.job_id, total, platform = self.platform.name(), "Upload session opened");
        self.track(&session);
        observer
            .on_step(UploadStep::SessionOpened {
                session: &session,
                reopened: false,
            })
            .await?;
        Ok(Established::Session(session))
    }

    /// Replace an expired session and learn how much the platform kept.
    async fn reopen(
        &self,
        req: &UploadRequest<'_>,
        mut session: UploadSession,
        observer: &dyn UploadObserver,
    ) -> AppResult<Established> {
        if session.reopens >= self.config.max_resumes {
            return Err(AppError::session_expired(format!(
                "session expired {} times",
                session.reopens + 1
            )));
        }
        warn!(
            job_id = %req.job_id,
            acknowledged = session.bytes_acked,
            "Upload session expired; opening a new one"
        );

        let remote = self
            .create_remote(req, session.total_size(), &session.content_digest, observer)
            .await?;
        session.replace_remote(remote);

        let progress = match self.query(req, &session, observer).await {
            Ok(progress) => progress,
            Err(e)
                if matches!(
                    e.kind,
                    ErrorKind::SessionExpiredUnrecoverable | ErrorKind::PlatformRejected
                ) =>
            {
                return Err(AppError::session_expired(format!(
                    "platform cannot report received bytes for the re-opened session: {}",
                    e.message
                )));
            }
            Err(e) => return Err(e),
        };

        match progress {
            RemoteProgress::Complete(video_id) => {
                self.already_complete(req, session, video_id, true, observer)
                    .await
            }
            RemoteProgress::Partial(received) if received < session.bytes_acked => {
                Err(AppError::session_expired(format!(
                    "re-opened session holds {received} bytes, {} were acknowledged",
                    session.bytes_acked
                )))
            }
            RemoteProgress::Partial(received) => {
                session.acknowledge(received);
                self.track(&session);
                observer
                    .on_step(UploadStep::SessionOpened {
                        session: &session,
                        reopened: true,
                    })
                    .await?;
                Ok(Established::Session(session))
            }
        }
    }

    /// The platform holds every byte; the job still passes through
    /// `session_open` before verification.
    async fn already_complete(
        &self,
        req: &UploadRequest<'_>,
        mut session: UploadSession,
        video_id: VideoId,
        reopened: bool,
        observer: &dyn UploadObserver,
    ) -> AppResult<Established> {
        session.acknowledge(session.total_size());
        info!(
            job_id = %req.job_id,
            video_id = %video_id,
            "Platform already holds the complete upload"
        );
        observer
            .on_step(UploadStep::SessionOpened {
                session: &session,
                reopened,
            })
            .await?;
        Ok(Established::Done(video_id))
    }

    async fn chunk_loop(
        &self,
        req: &UploadRequest<'_>,
        session: &mut UploadSession,
        reader: &mut ChunkReader,
        observer: &dyn UploadObserver,
    ) -> AppResult<VideoId> {
        let total = session.total_size();
        let mut resumes = 0u32;
        let mut last_resume_offset: Option<u64> = None;

        loop {
            if req.cancel.is_cancelled() {
                return Err(AppError::canceled("upload canceled between chunks"));
            }

            let Some(range) = session.next_range() else {
                observer.on_step(UploadStep::Verifying).await?;
                return match self.query(req, session, observer).await? {
                    RemoteProgress::Complete(video_id) => Ok(video_id),
                    RemoteProgress::Partial(received) => Err(AppError::platform_rejected(format!(
                        "platform holds {received} of {total} bytes but returned no video id"
                    ))),
                };
            };

            if session.is_expired_at(Utc::now()) {
                match self.reopen(req, session.clone(), observer).await? {
                    Established::Done(video_id) => {
                        observer.on_step(UploadStep::Verifying).await?;
                        return Ok(video_id);
                    }
                    Established::Session(reopened) => {
                        *session = reopened;
                        continue;
                    }
                }
            }

            let data = reader.read(range).await?;
            observer.on_step(UploadStep::ChunkSending { range }).await?;
            session.record_sent(range);
            self.track(session);
            debug!(job_id = %req.job_id, %range, "Sending chunk");

            let remote = session.remote.clone();
            let sent = self
                .retrying(req, observer, "chunk send", || {
                    let data = data.clone();
                    let remote = remote.clone();
                    let platform = Arc::clone(&self.platform);
                    self.call(req, move |token| {
                        let platform = Arc::clone(&platform);
                        let remote = remote.clone();
                        let data = data.clone();
                        async move {
                            let response = platform.send_chunk(&token, &remote, range, data).await?;
                            match response {
                                ChunkResponse::Continue { acknowledged } if acknowledged <= range.start => {
                                    Err(AppError::network(format!(
                                        "platform persisted none of chunk {range} (acknowledged {acknowledged})"
                                    )))
                                }
                                other => Ok(other),
                            }
                        }
                    })
                })
                .await;

            match sent {
                Ok(ChunkResponse::Continue { acknowledged }) => {
                    if session.acknowledge(acknowledged) {
                        self.track(session);
                        observer
                            .on_step(UploadStep::Acknowledged { session: &*session })
                            .await?;
                    }
                }
                Ok(ChunkResponse::Completed { video_id }) => {
                    session.acknowledge(total);
                    self.track(session);
                    observer
                        .on_step(UploadStep::Acknowledged { session: &*session })
                        .await?;
                    observer.on_step(UploadStep::Verifying).await?;
                    return Ok(video_id);
                }
                Err(e) if e.kind == ErrorKind::SessionExpiredUnrecoverable => {
                    match self.reopen(req, session.clone(), observer).await? {
                        Established::Done(video_id) => {
                            observer.on_step(UploadStep::Verifying).await?;
                            return Ok(video_id);
                        }
                        Established::Session(reopened) => *session = reopened,
                    }
                }
                Err(e) if e.is_retryable() => {
                    if let Some(previous) = last_resume_offset {
                        if session.bytes_acked <= previous {
                            return Err(AppError::network(format!(
                                "no progress since resuming at byte {previous}: {}",
                                e.message
                            )));
                        }
                    }
                    if resumes >= self.config.max_resumes {
                        return Err(AppError::network(format!(
                            "retry budget exhausted after {resumes} resumes: {}",
                            e.message
                        )));
                    }
                    resumes += 1;
                    warn!(
                        job_id = %req.job_id,
                        %range,
                        resume = resumes,
                        "Chunk attempts exhausted; asking the platform what it received"
                    );

                    match self.query(req, session, observer).await {
                        Ok(RemoteProgress::Complete(video_id)) => {
                            session.acknowledge(total);
                            self.track(session);
                            observer.on_step(UploadStep::Verifying).await?;
                            return Ok(video_id);
                        }
                        Ok(RemoteProgress::Partial(received)) => {
                            if received < session.bytes_acked {
                                return Err(AppError::session_expired(format!(
                                    "platform reports {received} bytes, {} were acknowledged",
                                    session.bytes_acked
                                )));
                            }
                            if session.acknowledge(received) {
                                observer
                                    .on_step(UploadStep::Acknowledged { session: &*session })
                                    .await?;
                            }
                            session.resumes += 1;
                            self.track(session);
                            last_resume_offset = Some(session.bytes_acked);
                            info!(job_id = %req.job_id, offset = session.bytes_acked, "Resuming upload");
                        }
                        Err(q) if q.kind == ErrorKind::SessionExpiredUnrecoverable => {
                            match self.reopen(req, session.clone(), observer).await? {
                                Established::Done(video_id) => {
                                    observer.on_step(UploadStep::Verifying).await?;
                                    return Ok(video_id);
                                }
                                Established::Session(reopened) => *session = reopened,
                            }
                        }
                        Err(q) => return Err(q),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn create_remote(
        &self,
        req: &UploadRequest<'_>,
        total: u64,
        digest: &str,
        observer: &dyn UploadObserver,
    ) -> AppResult<tubeferry_core::types::RemoteSession> {
        self.retrying(req, observer, "session create", || {
            let platform = Arc::clone(&self.platform);
            self.call(req, move |token| {
                let platform = Arc::clone(&platform);
                let metadata = req.metadata.clone();
                let digest = digest.to_string();
                async move {
                    platform
                        .create_session(&token, &metadata, total, &digest)
                        .await
                }
            })
        })
        .await
    }

    async fn query(
        &self,
        req: &UploadRequest<'_>,
        session: &UploadSession,
        observer: &dyn UploadObserver,
    ) -> AppResult<RemoteProgress> {
        let remote = session.remote.clone();
        self.retrying(req, observer, "received-range query", || {
            let platform = Arc::clone(&self.platform);
            let remote = remote.clone();
            self.call(req, move |token| {
                let platform = Arc::clone(&platform);
                let remote = remote.clone();
                async move { platform.query_received(&token, &remote).await }
            })
        })
        .await
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    async fn retrying<T, F, Fut>(
        &self,
        req: &UploadRequest<'_>,
        observer: &dyn UploadObserver,
        what: &str,
        mut op: F,
    ) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let attempts = self.config.chunk_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(job_id = %req.job_id, attempt, error = %e, "{what} failed; retrying");
                    observer
                        .on_step(UploadStep::Retrying {
                            attempt,
                            reason: &e.message,
                        })
                        .await?;
                    self.pause(req.cancel, self.backoff.delay(attempt)).await?;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Issue one authorized request, refreshing once if the token is refused.
    async fn call<T, F, Fut>(&self, req: &UploadRequest<'_>, mut op: F) -> AppResult<T>
    where
        F: FnMut(AccessToken) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let account_id = req.account_id;
        let token = self
            .acquire(req.cancel, self.credentials.get_valid_token(account_id))
            .await?;
        match self.timed(op(token.clone())).await {
            Err(e) if e.kind == ErrorKind::AuthExpired => {
                warn!(account_id = %account_id, "Platform rejected access token; refreshing");
                let fresh = self
                    .acquire(
                        req.cancel,
                        self.credentials.refresh_after_rejection(account_id, &token),
                    )
                    .await?;
                match self.timed(op(fresh)).await {
                    Err(e) if e.kind == ErrorKind::AuthExpired => Err(AppError::auth_expired(
                        format!("platform rejected a freshly refreshed token: {}", e.message),
                    )),
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Wait for a token no longer than one request and never past cancellation.
    /// Dropping the wait releases the account's refresh lock.
    async fn acquire(
        &self,
        cancel: &CancellationToken,
        fut: impl Future<Output = AppResult<AccessToken>>,
    ) -> AppResult<AccessToken> {
        tokio::select! {
            token = self.timed(fut) => token,
            _ = cancel.cancelled() => Err(AppError::canceled("upload canceled while waiting for a token")),
        }
    }

    async fn timed<T>(&self, fut: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        let limit = self.config.request_timeout();
        tokio::time::timeout(limit, fut).await.map_err(|_| {
            AppError::network(format!("request timed out after {}s", limit.as_secs()))
        })?
    }

    async fn pause(&self, cancel: &CancellationToken, delay: Duration) -> AppResult<()> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = cancel.cancelled() => Err(AppError::canceled("upload canceled during backoff")),
        }
    }

    fn track(&self, session: &UploadSession) {
        self.sessions.insert(session.job_id, session.clone());
    }
}
