//! Terminal progress sink.

use async_trait::async_trait;

use tubeferry_core::result::AppResult;
use tubeferry_core::traits::{ProgressSink, ProgressUpdate};

/// Prints each progress update as an indented block on stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl ProgressSink for StdoutSink {
    async fn publish(&self, update: ProgressUpdate) -> AppResult<()> {
        println!("[{}]", short_id(&update.job_id.to_string()));
        for line in update.text.lines() {
            println!("  {line}");
        }
        Ok(())
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
