//! Bulk upload from a JSON manifest.

use std::path::PathBuf;

use clap::Args;
use serde::Deserialize;

use tubeferry_core::config::AppConfig;
use tubeferry_core::error::{AppError, ErrorKind};
use tubeferry_core::result::AppResult;
use tubeferry_core::types::{OperatorId, VideoMetadata, Visibility};
use tubeferry_entity::job::{JobRequest, SourceDescriptor};

use crate::output::{self, OutputFormat};

/// Arguments for the bulk command
#[derive(Debug, Args)]
pub struct BulkArgs {
    /// JSON array of `{ source, title, description?, tags?, visibility?, operator?, account? }`
    #[arg(short, long)]
    pub manifest: PathBuf,
}

/// One manifest entry.
#[derive(Debug, Deserialize)]
struct ManifestEntry {
    source: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    visibility: Option<Visibility>,
    #[serde(default)]
    category_id: Option<String>,
    #[serde(default)]
    operator: Option<String>,
    #[serde(default)]
    account: Option<String>,
}

fn parse_manifest(raw: &str, config: &AppConfig) -> AppResult<Vec<JobRequest>> {
    let entries: Vec<ManifestEntry> = serde_json::from_str(raw)?;
    if entries.is_empty() {
        return Err(AppError::validation("manifest has no entries"));
    }
    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let source = SourceDescriptor::parse(&entry.source)
                .map_err(|e| AppError::new(e.kind, format!("entry {}: {}", i + 1, e.message)))?;
            Ok(JobRequest {
                operator_id: OperatorId::new(entry.operator.unwrap_or_else(|| "cli".to_string())),
                account_id: super::default_account(config, entry.account.as_deref())?,
                source,
                metadata: VideoMetadata {
                    title: entry.title,
                    description: entry.description,
                    tags: entry.tags,
                    category_id: entry.category_id,
                    visibility: entry.visibility.unwrap_or(config.upload.default_visibility),
                },
            })
        })
        .collect()
}

/// Execute the bulk command
pub async fn execute(args: &BulkArgs, config: AppConfig, format: OutputFormat) -> AppResult<()> {
    let raw = tokio::fs::read_to_string(&args.manifest).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::NotFound,
            format!("Failed to read manifest {}", args.manifest.display()),
            e,
        )
    })?;
    let requests = parse_manifest(&raw, &config)?;
    println!("Submitting {} uploads...", requests.len());

    let session = super::Session::start(config).await?;
    let ids = session.pipeline().submit_bulk(requests).await?;
    let views = session.finish(&ids).await?;

    output::print_jobs(&views, format);
    super::check_outcomes(&views)?;
    output::print_success(&format!("{} uploads complete", views.len()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubeferry_core::config::oauth::AccountSeed;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.oauth.accounts.push(AccountSeed {
            account_id: "main".into(),
            refresh_token: "refresh".into(),
            access_token: None,
            expires_at: None,
        });
        config
    }

    #[test]
    fn manifest_entries_keep_their_order() {
        let raw = r#"[
            {"source": "https://example.com/a.mp4", "title": "A"},
            {"source": "https://drive.google.com/file/d/abc/view", "title": "B",
             "visibility": "public", "operator": "bob", "account": "other"}
        ]"#;
        let requests = parse_manifest(raw, &config()).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].metadata.title, "A");
        assert_eq!(requests[0].operator_id.as_str(), "cli");
        assert_eq!(requests[0].account_id.as_str(), "main");
        assert_eq!(requests[1].source.kind(), "drive_link");
        assert_eq!(requests[1].metadata.visibility, Visibility::Public);
        assert_eq!(requests[1].account_id.as_str(), "other");
    }

    #[test]
    fn bad_source_names_the_entry() {
        let raw = r#"[{"source": "not a link", "title": "A"}]"#;
        let err = parse_manifest(raw, &config()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SourceAmbiguous);
        assert!(err.message.starts_with("entry 1:"));
    }

    #[test]
    fn empty_manifest_is_rejected() {
        let err = parse_manifest("[]", &config()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
