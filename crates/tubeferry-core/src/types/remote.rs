//! Shapes exchanged with the remote video platform.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a video created on the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Public watch URL for this video.
    pub fn watch_url(&self) -> String {
        format!("https://youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VideoId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A resumable upload session issued by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSession {
    /// Session URI that chunks are sent to.
    pub uri: String,
    /// Declared total size of the upload.
    pub total_size: u64,
    /// When the platform will forget the session.
    pub expires_at: DateTime<Utc>,
}

impl RemoteSession {
    /// Whether the session is past its deadline at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// The platform's answer to one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkResponse {
    /// More bytes are expected; `acknowledged` bytes have been persisted.
    Continue {
        /// Total bytes the platform holds (exclusive end offset).
        acknowledged: u64,
    },
    /// The upload is complete.
    Completed {
        /// The created video.
        video_id: VideoId,
    },
}

/// The platform's authoritative view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteProgress {
    /// The platform holds the first `n` bytes.
    Partial(u64),
    /// The platform already finished the upload.
    Complete(VideoId),
}
