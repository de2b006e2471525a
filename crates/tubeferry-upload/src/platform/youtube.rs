//! YouTube Data API v3 resumable upload client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, LOCATION, RANGE};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use tubeferry_core::config::upload::UploadConfig;
use tubeferry_core::error::{AppError, ErrorKind};
use tubeferry_core::result::AppResult;
use tubeferry_core::traits::platform::VideoPlatform;
use tubeferry_core::types::{
    AccessToken, ByteRange, ChunkResponse, RemoteProgress, RemoteSession, VideoId, VideoMetadata,
};

/// "Resume Incomplete", the status of a partially received session.
const RESUME_INCOMPLETE: u16 = 308;

/// Video resource returned when the upload completes.
#[derive(Debug, Deserialize)]
struct VideoResource {
    id: String,
}

/// Client for `videos.insert` with `uploadType=resumable`.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    client: reqwest::Client,
    api_base: String,
    default_category_id: String,
    session_ttl: Duration,
}

impl YouTubeClient {
    /// Create a client from upload settings.
    ///
    /// Redirects are disabled: a 308 is part of the protocol, not a redirect.
    pub fn new(config: &UploadConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Configuration, "failed to build upload client", e)
            })?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            default_category_id: config.default_category_id.clone(),
            session_ttl: config.session_ttl(),
        })
    }

    fn insert_url(&self) -> String {
        format!(
            "{}/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status",
            self.api_base
        )
    }

    async fn put(
        &self,
        token: &AccessToken,
        session: &RemoteSession,
        content_range: String,
        body: Bytes,
    ) -> AppResult<reqwest::Response> {
        self.client
            .put(&session.uri)
            .header(AUTHORIZATION, format!("Bearer {}", token.secret()))
            .header(CONTENT_RANGE, content_range)
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::NetworkTransient, "upload request failed", e))
    }

    /// Interpret a response to a chunk or a status query.
    async fn progress(response: reqwest::Response) -> AppResult<RemoteProgress> {
        let status = response.status();
        if status.as_u16() == RESUME_INCOMPLETE {
            return Ok(RemoteProgress::Partial(received_from(&response)?));
        }
        if status == StatusCode::OK || status == StatusCode::CREATED {
            let video: VideoResource = response.json().await?;
            return Ok(RemoteProgress::Complete(VideoId(video.id)));
        }
        Err(classify(response).await)
    }
}

#[async_trait]
impl VideoPlatform for YouTubeClient {
    fn name(&self) -> &str {
        "youtube"
    }

    async fn create_session(
        &self,
        token: &AccessToken,
        metadata: &VideoMetadata,
        total_size: u64,
        content_digest: &str,
    ) -> AppResult<RemoteSession> {
        let body = json!({
            "snippet": {
                "title": metadata.title,
                "description": metadata.description,
                "tags": metadata.tags,
                "categoryId": metadata
                    .category_id
                    .clone()
                    .unwrap_or_else(|| self.default_category_id.clone()),
            },
            "status": {
                "privacyStatus": metadata.visibility.as_str(),
            },
        });

        let response = self
            .client
            .post(self.insert_url())
            .header(AUTHORIZATION, format!("Bearer {}", token.secret()))
            .header("X-Upload-Content-Length", total_size)
            .header("X-Upload-Content-Type", "video/*")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::NetworkTransient, "session request failed", e)
            })?;

        if !response.status().is_success() {
            return Err(classify(response).await);
        }
        let uri = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::platform_rejected("session response has no Location header"))?
            .to_string();

        debug!(total_size, digest = content_digest, "Resumable session created");
        Ok(RemoteSession {
            uri,
            total_size,
            expires_at: Utc::now()
                + chrono::Duration::from_std(self.session_ttl)
                    .unwrap_or_else(|_| chrono::Duration::days(1)),
        })
    }

    async fn send_chunk(
        &self,
        token: &AccessToken,
        session: &RemoteSession,
        range: ByteRange,
        data: Bytes,
    ) -> AppResult<ChunkResponse> {
        let response = self
            .put(token, session, range.content_range(session.total_size), data)
            .await?;
        match Self::progress(response).await? {
            RemoteProgress::Partial(acknowledged) => Ok(ChunkResponse::Continue { acknowledged }),
            RemoteProgress::Complete(video_id) => Ok(ChunkResponse::Completed { video_id }),
        }
    }

    async fn query_received(
        &self,
        token: &AccessToken,
        session: &RemoteSession,
    ) -> AppResult<RemoteProgress> {
        let response = self
            .put(
                token,
                session,
                format!("bytes */{}", session.total_size),
                Bytes::new(),
            )
            .await?;
        Self::progress(response).await
    }
}

/// Bytes held by the platform according to a 308's `Range` header.
///
/// No header means nothing was persisted yet.
fn received_from(response: &reqwest::Response) -> AppResult<u64> {
    let Some(value) = response.headers().get(RANGE) else {
        return Ok(0);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::platform_rejected("unreadable Range header"))?;
    parse_range_end(value)
        .map(|last| last + 1)
        .ok_or_else(|| AppError::platform_rejected(format!("malformed Range header: {value}")))
}

/// Parse the inclusive end of `bytes=0-N`.
fn parse_range_end(value: &str) -> Option<u64> {
    let (start, end) = value.trim().strip_prefix("bytes=")?.split_once('-')?;
    if start.trim() != "0" {
        return None;
    }
    end.trim().parse().ok()
}

/// Map a refusal to its error kind.
async fn classify(response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = format!("platform returned {status}: {}", truncate(&body, 300));

    match status.as_u16() {
        401 => AppError::auth_expired(detail),
        403 if body.contains("quotaExceeded") || body.contains("uploadLimitExceeded") => {
            AppError::platform_rejected(detail)
        }
        403 => AppError::auth_expired(detail),
        404 | 410 => AppError::session_expired(detail),
        408 | 429 => AppError::network(detail),
        s if s >= 500 => AppError::network(detail),
        _ => AppError::platform_rejected(detail),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
