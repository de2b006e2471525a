//! Outbound progress channel trait.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::result::AppResult;
use crate::types::{JobId, JobState};

/// One user-facing status update for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// The job ID.
    pub job_id: JobId,
    /// Video title, for display.
    pub title: String,
    /// Current state.
    pub state: JobState,
    /// Bytes fetched or acknowledged so far.
    pub bytes: u64,
    /// Total size if known.
    pub total: Option<u64>,
    /// Percentage complete; `None` while the size is undiscovered.
    pub percent: Option<f64>,
    /// Recent transfer rate in bytes per second.
    pub bytes_per_second: f64,
    /// Estimated time remaining.
    #[serde(default, with = "opt_secs")]
    pub eta: Option<Duration>,
    /// Rendered status text.
    pub text: String,
}

/// Delivers rendered status updates to the requester (e.g. a chat message).
#[async_trait]
pub trait ProgressSink: Send + Sync + std::fmt::Debug + 'static {
    /// Publish one update.
    async fn publish(&self, update: ProgressUpdate) -> AppResult<()>;
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_secs()).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
