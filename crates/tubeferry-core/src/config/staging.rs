//! Staging store configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Local scratch storage for fetched source bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Root directory for all runtime data.
    #[serde(default = "default_data_root")]
    pub data_root: String,
    /// Global byte quota across all staged files (default 20 GiB).
    #[serde(default = "default_quota")]
    pub quota_bytes: u64,
    /// Re-hash sealed files before upload starts.
    #[serde(default = "default_true")]
    pub verify_checksum: bool,
}

impl StagingConfig {
    /// Directory holding staged source files.
    pub fn staging_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_root).join("staging")
    }

    /// Directory holding the job journal.
    pub fn journal_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_root).join("journal")
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            quota_bytes: default_quota(),
            verify_checksum: true,
        }
    }
}

fn default_data_root() -> String {
    "./data".to_string()
}

fn default_quota() -> u64 {
    20 * 1024 * 1024 * 1024
}

fn default_true() -> bool {
    true
}
