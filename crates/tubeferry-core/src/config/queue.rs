//! Admission control configuration.

use serde::{Deserialize, Serialize};

/// Concurrency caps for the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum simultaneously active jobs (N).
    #[serde(default = "default_global")]
    pub global_concurrency: usize,
    /// Maximum simultaneously active jobs per operator (M ≤ N).
    #[serde(default = "default_per_operator")]
    pub per_operator_concurrency: usize,
    /// Operators allowed to submit; empty allows everyone.
    #[serde(default)]
    pub allowed_operators: Vec<String>,
}

impl QueueConfig {
    /// Whether `operator` may submit jobs.
    pub fn is_allowed(&self, operator: &str) -> bool {
        self.allowed_operators.is_empty() || self.allowed_operators.iter().any(|o| o == operator)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            global_concurrency: default_global(),
            per_operator_concurrency: default_per_operator(),
            allowed_operators: Vec::new(),
        }
    }
}

fn default_global() -> usize {
    4
}

fn default_per_operator() -> usize {
    2
}
