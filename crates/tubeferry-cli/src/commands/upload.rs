//! Single video upload command.

use clap::Args;

use tubeferry_core::config::AppConfig;
use tubeferry_core::result::AppResult;
use tubeferry_core::types::{OperatorId, VideoMetadata, Visibility};
use tubeferry_entity::job::{JobRequest, SourceDescriptor};

use crate::output::{self, OutputFormat};

/// Arguments for the upload command
#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Direct link, drive share link, or `tg:<file_id>`
    #[arg(short, long)]
    pub source: String,

    /// Video title
    #[arg(short, long)]
    pub title: String,

    /// Video description
    #[arg(short, long, default_value = "")]
    pub description: String,

    /// Tag (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// private, unlisted or public (defaults to the configured visibility)
    #[arg(long)]
    pub visibility: Option<String>,

    /// Platform category id
    #[arg(long)]
    pub category: Option<String>,

    /// Operator the job is submitted as
    #[arg(long, default_value = "cli")]
    pub operator: String,

    /// Account to upload under (defaults to the first configured account)
    #[arg(long)]
    pub account: Option<String>,
}

impl UploadArgs {
    fn request(&self, config: &AppConfig) -> AppResult<JobRequest> {
        let visibility = match &self.visibility {
            Some(v) => v.parse::<Visibility>()?,
            None => config.upload.default_visibility,
        };
        Ok(JobRequest {
            operator_id: OperatorId::new(self.operator.clone()),
            account_id: super::default_account(config, self.account.as_deref())?,
            source: SourceDescriptor::parse(&self.source)?,
            metadata: VideoMetadata {
                title: self.title.clone(),
                description: self.description.clone(),
                tags: self.tags.clone(),
                category_id: self.category.clone(),
                visibility,
            },
        })
    }
}

/// Execute the upload command
pub async fn execute(args: &UploadArgs, config: AppConfig, format: OutputFormat) -> AppResult<()> {
    let request = args.request(&config)?;
    println!(
        "Uploading '{}' from {} as {}...",
        request.metadata.title, request.source, request.metadata.visibility
    );

    let session = super::Session::start(config).await?;
    let job_id = session.pipeline().submit(request).await?;
    let views = session.finish(&[job_id]).await?;

    output::print_jobs(&views, format);
    super::check_outcomes(&views)?;
    output::print_success("Upload complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubeferry_core::config::oauth::AccountSeed;
    use tubeferry_core::error::ErrorKind;

    fn args(source: &str) -> UploadArgs {
        UploadArgs {
            source: source.into(),
            title: "Launch".into(),
            description: String::new(),
            tags: vec!["demo".into()],
            visibility: None,
            category: None,
            operator: "cli".into(),
            account: None,
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.oauth.accounts.push(AccountSeed {
            account_id: "main".into(),
            refresh_token: "refresh".into(),
            access_token: None,
            expires_at: None,
        });
        config.upload.default_visibility = Visibility::Unlisted;
        config
    }

    #[test]
    fn request_uses_configured_defaults() {
        let request = args("https://example.com/v.mp4").request(&config()).unwrap();
        assert_eq!(request.account_id.as_str(), "main");
        assert_eq!(request.metadata.visibility, Visibility::Unlisted);
        assert_eq!(request.source.kind(), "url");
        assert_eq!(request.metadata.tags, vec!["demo".to_string()]);
    }

    #[test]
    fn explicit_visibility_and_attachment_source() {
        let mut a = args("tg:AgADBAAD");
        a.visibility = Some("public".into());
        let request = a.request(&config()).unwrap();
        assert_eq!(request.metadata.visibility, Visibility::Public);
        assert_eq!(request.source.kind(), "chat_attachment");
    }

    #[test]
    fn no_accounts_is_a_configuration_error() {
        let err = args("https://example.com/v.mp4")
            .request(&AppConfig::default())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }
}
