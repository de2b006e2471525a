//! Resume journaled jobs from a previous run.

use tubeferry_core::config::AppConfig;
use tubeferry_core::result::AppResult;

use crate::output::{self, OutputFormat};

/// Execute the recover command
pub async fn execute(config: AppConfig, format: OutputFormat) -> AppResult<()> {
    let session = super::Session::start(config).await?;
    let ids = session.pipeline().recover().await?;
    if ids.is_empty() {
        session.finish(&[]).await?;
        output::print_success("No unfinished jobs to recover");
        return Ok(());
    }

    println!("Resuming {} unfinished uploads...", ids.len());
    let views = session.finish(&ids).await?;
    output::print_jobs(&views, format);
    super::check_outcomes(&views)?;
    output::print_success(&format!("{} recovered uploads complete", views.len()));
    Ok(())
}
