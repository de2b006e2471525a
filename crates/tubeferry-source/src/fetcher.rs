//! Source fetcher.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use tubeferry_core::config::source::SourceConfig;
use tubeferry_core::error::{AppError, ErrorKind};
use tubeferry_core::result::AppResult;
use tubeferry_core::traits::attachment::AttachmentResolver;
use tubeferry_entity::job::SourceDescriptor;

use crate::drive::{self, DrivePatterns};
use crate::http::{build_client, send_error, status_error};
use crate::stream::SourceStream;

/// Largest drive warning page read while looking for the confirm form.
const MAX_INTERSTITIAL_BYTES: u64 = 256 * 1024;

/// Opens any [`SourceDescriptor`] as a [`SourceStream`].
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    /// Client with the redirect and connect limits applied.
    client: reqwest::Client,
    /// Limits and endpoints.
    config: SourceConfig,
    /// Chat attachment resolver, if chat integration is configured.
    attachments: Option<Arc<dyn AttachmentResolver>>,
    /// Drive link patterns.
    drive: DrivePatterns,
}

impl SourceFetcher {
    /// Create a fetcher.
    pub fn new(
        config: SourceConfig,
        attachments: Option<Arc<dyn AttachmentResolver>>,
    ) -> AppResult<Self> {
        Ok(Self {
            client: build_client(&config)?,
            config,
            attachments,
            drive: DrivePatterns::new()?,
        })
    }

    /// The HTTP client, shared with collaborators that talk to the same hosts.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Open the source for reading.
    ///
    /// Errors: `SourceAmbiguous` for unusable links, `SourceTooLarge` when
    /// the announced size is over the limit, `SourceUnreachable` for
    /// refusals, `NetworkTransient` for connection problems and 5xx.
    pub async fn open(&self, source: &SourceDescriptor) -> AppResult<SourceStream> {
        match source {
            SourceDescriptor::ChatAttachment { file_ref } => self.open_attachment(file_ref).await,
            SourceDescriptor::Url { url } => self.open_url(url).await,
            SourceDescriptor::DriveLink { url } => self.open_drive(url).await,
        }
    }

    async fn open_attachment(&self, file_ref: &str) -> AppResult<SourceStream> {
        let resolver = self.attachments.as_ref().ok_or_else(|| {
            AppError::configuration("chat attachments require chat.bot_token to be set")
        })?;
        let resolved = resolver.resolve(file_ref).await?;
        if let Some(size) = resolved.size {
            if size > self.config.max_source_bytes {
                return Err(AppError::source_too_large(format!(
                    "attachment is {size} bytes, limit is {}",
                    self.config.max_source_bytes
                )));
            }
        }
        debug!(file_ref, "Fetching chat attachment");
        let response = self.get(&resolved.download_url, &[]).await?;
        self.stream(response)
    }

    async fn open_url(&self, url: &str) -> AppResult<SourceStream> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|_| AppError::source_ambiguous(format!("invalid URL: {url}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::source_ambiguous(format!(
                "unsupported scheme in {url}"
            )));
        }
        info!(url, "Fetching direct link");
        let response = self.get(url, &[]).await?;
        self.stream(response)
    }

    async fn open_drive(&self, link: &str) -> AppResult<SourceStream> {
        let id = self.drive.file_id(link)?;
        let base = &self.config.drive_base_url;
        let url = drive::download_url(base, &id);
        info!(file_id = %id, "Fetching drive file");

        let response = self.get(&url, &[]).await?;
        if !is_html(&response) {
            return self.stream(response);
        }

        let page = self.read_page(response, &id).await?;
        let confirm = self.drive.parse_interstitial(&page, base, &id).ok_or_else(|| {
            AppError::source_unreachable(format!("drive file {id} is not publicly downloadable"))
        })?;
        debug!(file_id = %id, "Confirming large drive download");

        let response = self.get(&confirm.url, &confirm.params).await?;
        if is_html(&response) {
            return Err(AppError::source_unreachable(format!(
                "drive refused to serve file {id}"
            )));
        }
        self.stream(response)
    }

    async fn get(&self, url: &str, params: &[(String, String)]) -> AppResult<reqwest::Response> {
        let mut request = self.client.get(url);
        if !params.is_empty() {
            request = request.query(params);
        }
        let response = request.send().await.map_err(|e| send_error(e, url))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, url));
        }
        Ok(response)
    }

    async fn read_page(&self, response: reqwest::Response, id: &str) -> AppResult<String> {
        let oversized = |e: AppError| {
            if e.kind == ErrorKind::SourceTooLarge {
                AppError::source_unreachable(format!(
                    "drive returned an oversized page for file {id}"
                ))
            } else {
                e
            }
        };
        let mut stream = SourceStream::from_response(
            response,
            MAX_INTERSTITIAL_BYTES,
            Duration::from_secs(self.config.read_timeout_seconds),
        )
        .map_err(oversized)?;
        let mut page = Vec::new();
        while let Some(chunk) = stream.next_chunk().await.map_err(oversized)? {
            page.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&page).into_owned())
    }

    fn stream(&self, response: reqwest::Response) -> AppResult<SourceStream> {
        SourceStream::from_response(
            response,
            self.config.max_source_bytes,
            Duration::from_secs(self.config.read_timeout_seconds),
        )
    }
}

fn is_html(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"))
}
