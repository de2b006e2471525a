//! Chat attachment resolution trait.

use async_trait::async_trait;

use crate::result::AppResult;

/// A chat attachment resolved to something downloadable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttachment {
    /// Direct download URL.
    pub download_url: String,
    /// Size reported by the chat platform, if any.
    pub size: Option<u64>,
}

/// Resolves platform-specific file handles into download URLs.
#[async_trait]
pub trait AttachmentResolver: Send + Sync + std::fmt::Debug + 'static {
    /// Resolve `file_ref` (e.g. a Telegram `file_id`).
    async fn resolve(&self, file_ref: &str) -> AppResult<ResolvedAttachment>;
}
