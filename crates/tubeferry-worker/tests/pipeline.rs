//! End-to-end pipeline tests against an in-memory platform and a mock
//! source server.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::Semaphore;

use tubeferry_core::config::AppConfig;
use tubeferry_core::config::oauth::{AccountSeed, OAuthConfig};
use tubeferry_core::config::queue::QueueConfig;
use tubeferry_core::config::source::SourceConfig;
use tubeferry_core::config::staging::StagingConfig;
use tubeferry_core::config::upload::UploadConfig;
use tubeferry_core::error::{AppError, ErrorKind};
use tubeferry_core::events::{AccountEvent, EventPayload, JobEvent};
use tubeferry_core::result::AppResult;
use tubeferry_core::traits::{OAuthAuthority, VideoPlatform};
use tubeferry_core::types::{
    AccessToken, ByteRange, ChunkResponse, JobId, JobOutcome, JobState, RemoteProgress,
    RemoteSession, TokenGrant, VideoId, VideoMetadata,
};
use tubeferry_entity::job::{JobRequest, JobView, SourceDescriptor};
use tubeferry_worker::{Collaborators, EventReceiver, ShutdownMode, UploadPipeline};

const CHUNK: u64 = 16;

#[derive(Debug, Default)]
struct PlatformState {
    /// Bytes received per session URI.
    received: HashMap<String, u64>,
    sent: Vec<(String, ByteRange)>,
    /// Chunk offsets that fail once with a transient error.
    fail_once: HashSet<u64>,
    created: u32,
}

/// Platform that keeps sessions in memory. Every chunk takes one permit
/// from `gate`, so tests can hold uploads mid-transfer.
#[derive(Debug)]
struct FakePlatform {
    state: Mutex<PlatformState>,
    gate: Semaphore,
}

impl FakePlatform {
    fn open() -> Arc<Self> {
        Self::gated(Semaphore::MAX_PERMITS / 2)
    }

    fn gated(permits: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PlatformState::default()),
            gate: Semaphore::new(permits),
        })
    }

    fn fail_once_at(&self, offset: u64) {
        self.state.lock().unwrap().fail_once.insert(offset);
    }

    fn release(&self) {
        self.gate.add_permits(10_000);
    }

    fn sent(&self) -> Vec<(String, ByteRange)> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Mark every session as fully received, as if the last chunk landed
    /// after the uploader stopped listening.
    fn complete_remotely(&self, total: u64) {
        for received in self.state.lock().unwrap().received.values_mut() {
            *received = total;
        }
    }
}

fn video_id_for(uri: &str) -> VideoId {
    VideoId::from(format!("vid-{}", uri.rsplit('/').next().unwrap_or("0")).as_str())
}

#[async_trait]
impl VideoPlatform for FakePlatform {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create_session(
        &self,
        _token: &AccessToken,
        _metadata: &VideoMetadata,
        total_size: u64,
        _digest: &str,
    ) -> AppResult<RemoteSession> {
        let mut s = self.state.lock().unwrap();
        s.created += 1;
        let uri = format!("fake://session/{}", s.created);
        s.received.insert(uri.clone(), 0);
        Ok(RemoteSession {
            uri,
            total_size,
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }

    async fn send_chunk(
        &self,
        _token: &AccessToken,
        session: &RemoteSession,
        range: ByteRange,
        data: Bytes,
    ) -> AppResult<ChunkResponse> {
        self.gate
            .acquire()
            .await
            .map_err(|_| AppError::internal("gate closed"))?
            .forget();

        let mut s = self.state.lock().unwrap();
        s.sent.push((session.uri.clone(), range));
        assert_eq!(data.len() as u64, range.len());
        if s.fail_once.remove(&range.start) {
            return Err(AppError::network("connection reset"));
        }
        let received = s
            .received
            .get_mut(&session.uri)
            .ok_or_else(|| AppError::session_expired("unknown session"))?;
        if range.start != *received {
            return Err(AppError::platform_rejected("out of order chunk"));
        }
        *received = range.end;
        if *received == session.total_size {
            Ok(ChunkResponse::Completed {
                video_id: video_id_for(&session.uri),
            })
        } else {
            Ok(ChunkResponse::Continue {
                acknowledged: *received,
            })
        }
    }

    async fn query_received(
        &self,
        _token: &AccessToken,
        session: &RemoteSession,
    ) -> AppResult<RemoteProgress> {
        let s = self.state.lock().unwrap();
        match s.received.get(&session.uri) {
            Some(n) if *n == session.total_size => {
                Ok(RemoteProgress::Complete(video_id_for(&session.uri)))
            }
            Some(n) => Ok(RemoteProgress::Partial(*n)),
            None => Err(AppError::session_expired("unknown session")),
        }
    }
}

/// Refuses the refresh token `"revoked"`, grants everything else.
#[derive(Debug)]
struct FakeAuthority;

#[async_trait]
impl OAuthAuthority for FakeAuthority {
    async fn refresh(&self, refresh_token: &str) -> AppResult<TokenGrant> {
        if refresh_token == "revoked" {
            return Err(AppError::credential_revoked("invalid_grant"));
        }
        Ok(TokenGrant {
            access_token: AccessToken::from("access"),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

fn seed(account: &str, refresh: &str) -> AccountSeed {
    AccountSeed {
        account_id: account.to_string(),
        refresh_token: refresh.to_string(),
        access_token: None,
        expires_at: None,
    }
}

fn config(root: &Path, global: usize, per_operator: usize) -> AppConfig {
    AppConfig {
        staging: StagingConfig {
            data_root: root.display().to_string(),
            ..StagingConfig::default()
        },
        source: SourceConfig {
            fetch_attempts: 2,
            ..SourceConfig::default()
        },
        upload: UploadConfig {
            chunk_size_bytes: CHUNK,
            chunk_attempts: 3,
            max_resumes: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 2,
            ..UploadConfig::default()
        },
        oauth: OAuthConfig {
            accounts: vec![seed("main", "refresh"), seed("lost", "revoked")],
            ..OAuthConfig::default()
        },
        queue: QueueConfig {
            global_concurrency: global,
            per_operator_concurrency: per_operator,
            allowed_operators: vec!["alice".into(), "bob".into()],
        },
        ..AppConfig::default()
    }
}

async fn pipeline(config: AppConfig, platform: &Arc<FakePlatform>) -> UploadPipeline {
    UploadPipeline::new(
        config,
        Collaborators {
            platform: Arc::clone(platform) as Arc<dyn VideoPlatform>,
            authority: Arc::new(FakeAuthority),
            attachments: None,
        },
    )
    .await
    .unwrap()
}

fn request(operator: &str, account: &str, url: String) -> JobRequest {
    JobRequest {
        operator_id: operator.into(),
        account_id: account.into(),
        source: SourceDescriptor::Url { url },
        metadata: VideoMetadata::titled("Launch video"),
    }
}

async fn serve(server: &mut mockito::Server, path: &str, len: usize) -> mockito::Mock {
    server
        .mock("GET", path)
        .with_status(200)
        .with_body(vec![9u8; len])
        .create_async()
        .await
}

async fn wait_for(
    pipeline: &UploadPipeline,
    job_id: &JobId,
    ready: impl Fn(&JobView) -> bool,
) -> JobView {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let view = pipeline.status(job_id).await.unwrap();
            if ready(&view) {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job did not reach the expected state")
}

async fn finish(pipeline: &UploadPipeline, job_id: &JobId) -> JobView {
    tokio::time::timeout(Duration::from_secs(10), pipeline.wait(job_id))
        .await
        .expect("job did not finish")
        .unwrap()
}

fn files_in(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

fn drain(rx: &mut EventReceiver) -> Vec<EventPayload> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event.payload);
    }
    events
}

#[tokio::test]
async fn failed_chunk_is_resent_alone() {
    let mut server = mockito::Server::new_async().await;
    serve(&mut server, "/clip.mp4", 50 * CHUNK as usize).await;
    let dir = tempfile::tempdir().unwrap();
    let platform = FakePlatform::open();
    platform.fail_once_at(29 * CHUNK);
    let pipeline = pipeline(config(dir.path(), 4, 2), &platform).await;
    let mut events = pipeline.subscribe();

    let job_id = pipeline
        .submit(request("alice", "main", format!("{}/clip.mp4", server.url())))
        .await
        .unwrap();
    let view = finish(&pipeline, &job_id).await;

    assert_eq!(view.state, JobState::Completed);
    assert_eq!(view.acknowledged_bytes, 50 * CHUNK);
    assert_eq!(view.total_bytes, Some(50 * CHUNK));
    assert!(view.retry_count >= 1);
    assert!(matches!(view.outcome, Some(JobOutcome::Succeeded { .. })));

    let sent = platform.sent();
    assert_eq!(sent.len(), 51);
    let resent: Vec<_> = sent.iter().filter(|(_, r)| r.start == 29 * CHUNK).collect();
    assert_eq!(resent.len(), 2);

    assert!(files_in(&dir.path().join("staging")).is_empty());
    assert!(files_in(&dir.path().join("journal")).is_empty());

    let events = drain(&mut events);
    let finished = events
        .iter()
        .filter(|e| matches!(e, EventPayload::Job(JobEvent::Finished { .. })))
        .count();
    assert_eq!(finished, 1);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, EventPayload::Job(JobEvent::Retrying { .. })))
    );
}

#[tokio::test]
async fn per_operator_cap_keeps_second_job_waiting() {
    let mut server = mockito::Server::new_async().await;
    serve(&mut server, "/a.mp4", 4 * CHUNK as usize).await;
    let dir = tempfile::tempdir().unwrap();
    let platform = FakePlatform::gated(0);
    let pipeline = pipeline(config(dir.path(), 4, 1), &platform).await;
    let url = format!("{}/a.mp4", server.url());

    let first = pipeline.submit(request("alice", "main", url.clone())).await.unwrap();
    let second = pipeline.submit(request("alice", "main", url.clone())).await.unwrap();
    let other = pipeline.submit(request("bob", "main", url)).await.unwrap();

    let uploading = |v: &JobView| v.state == JobState::ChunkUploading;
    wait_for(&pipeline, &first, uploading).await;
    wait_for(&pipeline, &other, uploading).await;

    assert_eq!(pipeline.status(&second).await.unwrap().state, JobState::Pending);
    let stats = pipeline.stats().await;
    assert_eq!(stats.active, 2);
    assert_eq!(stats.waiting, 1);

    platform.release();
    for id in [first, second, other] {
        assert_eq!(finish(&pipeline, &id).await.state, JobState::Completed);
    }
}

#[tokio::test]
async fn cancel_stops_waiting_and_running_jobs() {
    let mut server = mockito::Server::new_async().await;
    serve(&mut server, "/run.mp4", 8 * CHUNK as usize).await;
    let never = server
        .mock("GET", "/queued.mp4")
        .expect(0)
        .create_async()
        .await;
    let dir = tempfile::tempdir().unwrap();
    let platform = FakePlatform::gated(0);
    let pipeline = pipeline(config(dir.path(), 1, 1), &platform).await;
    let mut events = pipeline.subscribe();

    let running = pipeline
        .submit(request("alice", "main", format!("{}/run.mp4", server.url())))
        .await
        .unwrap();
    let queued = pipeline
        .submit(request("bob", "main", format!("{}/queued.mp4", server.url())))
        .await
        .unwrap();
    wait_for(&pipeline, &running, |v| v.state == JobState::ChunkUploading).await;

    pipeline.cancel(&queued).await.unwrap();
    let view = pipeline.status(&queued).await.unwrap();
    assert_eq!(view.state, JobState::Canceled);
    assert_eq!(view.outcome, Some(JobOutcome::Canceled));

    pipeline.cancel(&running).await.unwrap();
    platform.release();
    let view = finish(&pipeline, &running).await;
    assert_eq!(view.state, JobState::Canceled);
    assert_eq!(platform.sent().len(), 1);

    let err = pipeline.cancel(&running).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);

    assert!(files_in(&dir.path().join("staging")).is_empty());
    assert!(files_in(&dir.path().join("journal")).is_empty());
    never.assert_async().await;

    let canceled = drain(&mut events)
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                EventPayload::Job(JobEvent::Finished {
                    outcome: JobOutcome::Canceled,
                    ..
                })
            )
        })
        .count();
    assert_eq!(canceled, 2);
}

#[tokio::test]
async fn revoked_account_holds_jobs_until_reauthorized() {
    let mut server = mockito::Server::new_async().await;
    serve(&mut server, "/v.mp4", 3 * CHUNK as usize).await;
    let dir = tempfile::tempdir().unwrap();
    let platform = FakePlatform::open();
    let pipeline = pipeline(config(dir.path(), 1, 1), &platform).await;
    let mut events = pipeline.subscribe();
    let url = format!("{}/v.mp4", server.url());

    let first = pipeline.submit(request("alice", "lost", url.clone())).await.unwrap();
    let held = pipeline.submit(request("bob", "lost", url)).await.unwrap();

    let view = finish(&pipeline, &first).await;
    assert_eq!(view.state, JobState::Failed);
    assert_eq!(
        view.outcome.as_ref().and_then(JobOutcome::error_kind),
        Some(ErrorKind::CredentialRevoked)
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pipeline.status(&held).await.unwrap().state, JobState::Pending);
    assert_eq!(pipeline.stats().await.held_accounts, 1);
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        EventPayload::Account(AccountEvent::Revoked { account_id, .. }) if account_id.as_str() == "lost"
    )));

    pipeline.reauthorize(&"lost".into(), "fresh").await.unwrap();
    let view = finish(&pipeline, &held).await;
    assert_eq!(view.state, JobState::Completed);
    assert_eq!(view.acknowledged_bytes, 3 * CHUNK);
    assert_eq!(pipeline.stats().await.held_accounts, 0);
}

#[tokio::test]
async fn persisted_job_resumes_after_restart_without_refetching() {
    let mut server = mockito::Server::new_async().await;
    let source = server
        .mock("GET", "/long.mp4")
        .with_status(200)
        .with_body(vec![3u8; 10 * CHUNK as usize])
        .expect(1)
        .create_async()
        .await;
    let dir = tempfile::tempdir().unwrap();
    let platform = FakePlatform::gated(3);

    let first = pipeline(config(dir.path(), 2, 2), &platform).await;
    let job_id = first
        .submit(request("alice", "main", format!("{}/long.mp4", server.url())))
        .await
        .unwrap();
    wait_for(&first, &job_id, |v| v.acknowledged_bytes == 3 * CHUNK).await;
    wait_for(&first, &job_id, |v| v.state == JobState::ChunkUploading).await;

    tokio::join!(first.shutdown(ShutdownMode::Persist), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        platform.release();
    });
    drop(first);

    assert_eq!(files_in(&dir.path().join("journal")), vec![format!("{job_id}.json")]);
    assert_eq!(files_in(&dir.path().join("staging")), vec![format!("{job_id}.bin")]);

    let second = pipeline(config(dir.path(), 2, 2), &platform).await;
    assert_eq!(second.recover().await.unwrap(), vec![job_id]);
    let view = finish(&second, &job_id).await;

    assert_eq!(view.state, JobState::Completed);
    assert_eq!(view.acknowledged_bytes, 10 * CHUNK);
    let sent = platform.sent();
    assert_eq!(sent.len(), 10);
    assert!(sent.iter().all(|(uri, _)| uri == &sent[0].0));
    source.assert_async().await;
    assert!(files_in(&dir.path().join("journal")).is_empty());
}

#[tokio::test]
async fn upload_finished_before_restart_completes_on_recovery() {
    let mut server = mockito::Server::new_async().await;
    serve(&mut server, "/late.mp4", 10 * CHUNK as usize).await;
    let dir = tempfile::tempdir().unwrap();
    let platform = FakePlatform::gated(3);

    let first = pipeline(config(dir.path(), 2, 2), &platform).await;
    let job_id = first
        .submit(request("alice", "main", format!("{}/late.mp4", server.url())))
        .await
        .unwrap();
    wait_for(&first, &job_id, |v| v.acknowledged_bytes == 3 * CHUNK).await;
    wait_for(&first, &job_id, |v| v.state == JobState::ChunkUploading).await;

    tokio::join!(first.shutdown(ShutdownMode::Persist), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        platform.release();
    });
    drop(first);
    platform.complete_remotely(10 * CHUNK);
    let sent_before = platform.sent().len();

    let second = pipeline(config(dir.path(), 2, 2), &platform).await;
    let mut events = second.subscribe();
    assert_eq!(second.recover().await.unwrap(), vec![job_id]);
    let view = finish(&second, &job_id).await;

    assert_eq!(view.state, JobState::Completed);
    assert_eq!(view.acknowledged_bytes, 10 * CHUNK);
    assert_eq!(
        view.outcome,
        Some(JobOutcome::Succeeded {
            video_id: VideoId::from("vid-1")
        })
    );
    assert_eq!(platform.sent().len(), sent_before);
    assert!(files_in(&dir.path().join("journal")).is_empty());
    assert!(files_in(&dir.path().join("staging")).is_empty());

    let states: Vec<JobState> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            EventPayload::Job(JobEvent::StateChanged { to, .. }) => Some(to),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            JobState::Staged,
            JobState::SessionOpen,
            JobState::Verifying,
            JobState::Completed
        ]
    );
}

#[tokio::test]
async fn submissions_are_checked_before_queueing() {
    let dir = tempfile::tempdir().unwrap();
    let platform = FakePlatform::open();
    let pipeline = pipeline(config(dir.path(), 1, 1), &platform).await;
    let url = "https://example.com/v.mp4".to_string();

    let err = pipeline
        .submit(request("mallory", "main", url.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Authorization);

    let err = pipeline
        .submit(request("alice", "nobody", url.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let mut untitled = request("alice", "main", url.clone());
    untitled.metadata.title = String::new();
    let err = pipeline
        .submit_bulk(vec![request("alice", "main", url.clone()), untitled])
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(pipeline.jobs().await.is_empty());

    pipeline.shutdown(ShutdownMode::Drain).await;
    let err = pipeline.submit(request("alice", "main", url)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
}
