//! Source fetcher configuration.

use serde::{Deserialize, Serialize};

/// Limits and endpoints for fetching source videos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Largest accepted source in bytes (default 2 GiB).
    #[serde(default = "default_max_source")]
    pub max_source_bytes: u64,
    /// Maximum redirect hops followed for direct links.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// TCP connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Timeout in seconds for a stalled read.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,
    /// Total fetch attempts for transient network failures.
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
    /// Base URL of the cloud drive (overridable for testing).
    #[serde(default = "default_drive_base")]
    pub drive_base_url: String,
    /// User agent sent with every source request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: default_max_source(),
            max_redirects: default_max_redirects(),
            connect_timeout_seconds: default_connect_timeout(),
            read_timeout_seconds: default_read_timeout(),
            fetch_attempts: default_fetch_attempts(),
            drive_base_url: default_drive_base(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_max_source() -> u64 {
    2 * 1024 * 1024 * 1024
}

fn default_max_redirects() -> usize {
    5
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_read_timeout() -> u64 {
    60
}

fn default_fetch_attempts() -> u32 {
    3
}

fn default_drive_base() -> String {
    "https://drive.google.com".to_string()
}

fn default_user_agent() -> String {
    concat!("tubeferry/", env!("CARGO_PKG_VERSION")).to_string()
}
