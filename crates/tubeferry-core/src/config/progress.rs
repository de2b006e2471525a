//! Progress reporting configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Throttling for user-facing progress updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Minimum seconds between two updates for the same job.
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    /// Sliding window used to estimate the transfer rate.
    #[serde(default = "default_window")]
    pub rate_window_seconds: u64,
}

impl ProgressConfig {
    /// Minimum interval between updates.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Rate estimation window.
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_seconds)
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
            rate_window_seconds: default_window(),
        }
    }
}

fn default_interval() -> u64 {
    3
}

fn default_window() -> u64 {
    10
}
