//! CLI command definitions and dispatch.

pub mod bulk;
pub mod config;
pub mod reap;
pub mod recover;
pub mod upload;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::warn;

use tubeferry_core::config::AppConfig;
use tubeferry_core::error::AppError;
use tubeferry_core::result::AppResult;
use tubeferry_core::types::{AccountId, JobId};
use tubeferry_entity::job::JobView;
use tubeferry_worker::{ProgressReporter, ShutdownMode, UploadPipeline};

use crate::output::OutputFormat;
use crate::sink::StdoutSink;

/// Tubeferry: resumable video uploads from links and chat attachments
#[derive(Debug, Parser)]
#[command(name = "tubeferry", version, about, long_about = None)]
pub struct Cli {
    /// Directory holding `default.toml` and environment overlays
    #[arg(short, long, default_value = "config")]
    pub config: String,

    /// Environment overlay to apply (`{config}/{env}.toml`)
    #[arg(short, long, default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upload one video
    Upload(upload::UploadArgs),
    /// Upload every entry of a JSON manifest, in order
    Bulk(bulk::BulkArgs),
    /// Resume jobs left unfinished by a previous run
    Recover,
    /// Delete staged files no journaled job owns
    Reap,
    /// Print the effective configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self, config: AppConfig) -> AppResult<()> {
        match &self.command {
            Commands::Upload(args) => upload::execute(args, config, self.format).await,
            Commands::Bulk(args) => bulk::execute(args, config, self.format).await,
            Commands::Recover => recover::execute(config, self.format).await,
            Commands::Reap => reap::execute(config, self.format).await,
            Commands::Config => config::execute(&config, self.format),
        }
    }
}

/// Account used when none is given: the first configured one.
pub fn default_account(config: &AppConfig, requested: Option<&str>) -> AppResult<AccountId> {
    if let Some(account) = requested {
        return Ok(AccountId::new(account));
    }
    config
        .oauth
        .accounts
        .first()
        .map(|seed| AccountId::new(seed.account_id.clone()))
        .ok_or_else(|| AppError::configuration("no accounts configured under [oauth]"))
}

/// A started pipeline with a progress printer attached.
pub struct Session {
    pipeline: UploadPipeline,
    reporter: tokio::task::JoinHandle<()>,
}

impl Session {
    /// Start the pipeline and subscribe the printer before any job exists.
    pub async fn start(config: AppConfig) -> AppResult<Self> {
        let progress = config.progress.clone();
        let pipeline = UploadPipeline::from_config(config).await?;
        let reporter = ProgressReporter::new(&progress).spawn(pipeline.subscribe(), Arc::new(StdoutSink));
        Ok(Self { pipeline, reporter })
    }

    /// The running pipeline.
    pub fn pipeline(&self) -> &UploadPipeline {
        &self.pipeline
    }

    /// Wait for every job, then drain the pipeline.
    ///
    /// Ctrl-C stops running jobs at their next chunk boundary and keeps them
    /// journaled for `tubeferry recover`.
    pub async fn finish(self, ids: &[JobId]) -> AppResult<Vec<JobView>> {
        let pipeline = &self.pipeline;
        let waited = async {
            let mut views = Vec::with_capacity(ids.len());
            for id in ids {
                views.push(pipeline.wait(id).await?);
            }
            Ok::<_, AppError>(views)
        };

        let result = tokio::select! {
            result = waited => {
                pipeline.shutdown(ShutdownMode::Drain).await;
                result
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted; persisting unfinished jobs");
                pipeline.shutdown(ShutdownMode::Persist).await;
                Err(AppError::canceled(
                    "interrupted; run `tubeferry recover` to resume unfinished jobs",
                ))
            }
        };

        let Self { pipeline, reporter } = self;
        drop(pipeline);
        if let Err(e) = reporter.await {
            warn!(error = %e, "Progress printer stopped abnormally");
        }
        result
    }
}

/// Turn a batch result into the process outcome.
pub fn check_outcomes(views: &[JobView]) -> AppResult<()> {
    let failed = views
        .iter()
        .filter(|v| v.outcome.as_ref().and_then(|o| o.error_kind()).is_some())
        .count();
    if failed > 0 {
        return Err(AppError::internal(format!(
            "{failed} of {} jobs did not complete",
            views.len()
        )));
    }
    Ok(())
}
