//! Upload session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Visibility;

/// Chunk granularity required by the resumable protocol.
pub const CHUNK_ALIGNMENT: u64 = 256 * 1024;

/// Resumable upload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Chunk size in bytes (default 8 MiB, multiple of 256 KiB).
    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: u64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Session lifetime assumed when the platform does not state one.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: u64,
    /// Attempts per chunk before consulting the platform's received range.
    #[serde(default = "default_chunk_attempts")]
    pub chunk_attempts: u32,
    /// Resumes from the platform's received range before giving up.
    #[serde(default = "default_max_resumes")]
    pub max_resumes: u32,
    /// First backoff delay in milliseconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
    /// Platform API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Category used when a job does not name one.
    #[serde(default = "default_category")]
    pub default_category_id: String,
    /// Visibility used by the CLI when none is given.
    #[serde(default)]
    pub default_visibility: Visibility,
}

impl UploadConfig {
    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Assumed session lifetime.
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: default_chunk_size(),
            request_timeout_seconds: default_request_timeout(),
            session_ttl_seconds: default_session_ttl(),
            chunk_attempts: default_chunk_attempts(),
            max_resumes: default_max_resumes(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
            api_base: default_api_base(),
            default_category_id: default_category(),
            default_visibility: Visibility::default(),
        }
    }
}

fn default_chunk_size() -> u64 {
    8 * 1024 * 1024
}

fn default_request_timeout() -> u64 {
    120
}

fn default_session_ttl() -> u64 {
    86_400
}

fn default_chunk_attempts() -> u32 {
    5
}

fn default_max_resumes() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    500
}

fn default_backoff_max() -> u64 {
    30_000
}

fn default_api_base() -> String {
    "https://www.googleapis.com".to_string()
}

fn default_category() -> String {
    "22".to_string()
}
