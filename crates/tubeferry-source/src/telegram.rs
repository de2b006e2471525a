//! Telegram Bot API attachment resolver.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use tubeferry_core::config::chat::ChatConfig;
use tubeferry_core::error::{AppError, ErrorKind};
use tubeferry_core::result::AppResult;
use tubeferry_core::traits::attachment::{AttachmentResolver, ResolvedAttachment};

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// `getFile` result.
#[derive(Debug, Deserialize)]
struct TelegramFile {
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    file_path: Option<String>,
}

/// Resolves chat `file_id`s through the Bot API `getFile` method.
#[derive(Clone)]
pub struct TelegramAttachmentResolver {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl std::fmt::Debug for TelegramAttachmentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramAttachmentResolver")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl TelegramAttachmentResolver {
    /// Create a resolver from chat settings.
    ///
    /// Returns `None` when no bot token is configured.
    pub fn from_config(client: reqwest::Client, config: &ChatConfig) -> Option<Self> {
        config
            .bot_token
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|token| Self::new(client, config.api_base.clone(), token.clone()))
    }

    /// Create a resolver for an explicit endpoint and token.
    pub fn new(client: reqwest::Client, api_base: String, bot_token: String) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
        }
    }
}

#[async_trait]
impl AttachmentResolver for TelegramAttachmentResolver {
    async fn resolve(&self, file_ref: &str) -> AppResult<ResolvedAttachment> {
        let url = format!("{}/bot{}/getFile", self.api_base, self.bot_token);
        let response = self
            .client
            .get(&url)
            .query(&[("file_id", file_ref)])
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::NetworkTransient,
                    "chat platform unreachable",
                    e,
                )
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AppError::network(format!("getFile returned {status}")));
        }

        let body: ApiResponse<TelegramFile> = response.json().await.map_err(|e| {
            AppError::with_source(
                ErrorKind::SourceUnreachable,
                format!("getFile returned an unreadable body ({status})"),
                e,
            )
        })?;

        if !body.ok {
            return Err(AppError::source_unreachable(format!(
                "attachment {file_ref} cannot be resolved: {}",
                body.description.unwrap_or_else(|| status.to_string())
            )));
        }

        let file = body
            .result
            .ok_or_else(|| AppError::source_unreachable("getFile returned no file"))?;
        let path = file.file_path.ok_or_else(|| {
            AppError::source_unreachable(format!("attachment {file_ref} has no download path"))
        })?;

        debug!(file_ref, size = ?file.file_size, "Resolved chat attachment");
        Ok(ResolvedAttachment {
            download_url: format!("{}/file/bot{}/{}", self.api_base, self.bot_token, path),
            size: file.file_size,
        })
    }
}
