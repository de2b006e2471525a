//! Orphaned staging file cleanup.

use serde::Serialize;
use tabled::Tabled;

use tubeferry_core::config::AppConfig;
use tubeferry_core::result::AppResult;
use tubeferry_worker::UploadPipeline;

use crate::output::{self, OutputFormat};

#[derive(Debug, Serialize, Tabled)]
struct ReapedRow {
    #[tabled(rename = "Deleted file")]
    path: String,
}

/// Execute the reap command
pub async fn execute(config: AppConfig, format: OutputFormat) -> AppResult<()> {
    let pipeline = UploadPipeline::from_config(config).await?;
    let removed = pipeline.reap().await?;
    pipeline.shutdown(tubeferry_worker::ShutdownMode::Drain).await;

    if removed.is_empty() {
        output::print_success("No orphaned staged files");
        return Ok(());
    }
    let rows: Vec<ReapedRow> = removed
        .iter()
        .map(|p| ReapedRow {
            path: p.display().to_string(),
        })
        .collect();
    output::print_list(&rows, format);
    output::print_warning(&format!("Removed {} orphaned staged files", rows.len()));
    Ok(())
}
