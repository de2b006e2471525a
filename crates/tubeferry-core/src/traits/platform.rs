//! Remote video platform trait (resumable upload protocol).

use async_trait::async_trait;
use bytes::Bytes;

use crate::result::AppResult;
use crate::types::{
    AccessToken, ByteRange, ChunkResponse, RemoteProgress, RemoteSession, VideoMetadata,
};

/// A video-hosting platform that accepts resumable, chunked uploads.
///
/// Error contract shared by every method:
/// - `AuthExpired` when the access token is rejected,
/// - `SessionExpiredUnrecoverable` when the session no longer exists,
/// - `NetworkTransient` for connect errors, timeouts, 429 and 5xx,
/// - `PlatformRejected` for any other refusal.
#[async_trait]
pub trait VideoPlatform: Send + Sync + std::fmt::Debug + 'static {
    /// Return the platform name (e.g., "youtube").
    fn name(&self) -> &str;

    /// Open a resumable session for `total_size` bytes.
    ///
    /// `content_digest` identifies the bytes so a re-opened session can be
    /// matched with what the platform already received.
    async fn create_session(
        &self,
        token: &AccessToken,
        metadata: &VideoMetadata,
        total_size: u64,
        content_digest: &str,
    ) -> AppResult<RemoteSession>;

    /// Send one chunk covering `range`.
    async fn send_chunk(
        &self,
        token: &AccessToken,
        session: &RemoteSession,
        range: ByteRange,
        data: Bytes,
    ) -> AppResult<ChunkResponse>;

    /// Ask the platform how many bytes of the session it holds.
    async fn query_received(
        &self,
        token: &AccessToken,
        session: &RemoteSession,
    ) -> AppResult<RemoteProgress>;
}
