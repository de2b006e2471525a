//! # tubeferry-source
//!
//! Resolves a [`SourceDescriptor`](tubeferry_entity::job::SourceDescriptor)
//! into a byte stream with a size hint. One handler per variant: chat
//! attachments go through an [`AttachmentResolver`](tubeferry_core::traits::AttachmentResolver),
//! direct links are fetched with bounded redirects, and drive links are
//! rewritten to their download endpoint with the large-file confirmation
//! page handled.

pub mod drive;
pub mod fetcher;
pub mod http;
pub mod stream;
pub mod telegram;

pub use fetcher::SourceFetcher;
pub use stream::SourceStream;
pub use telegram::TelegramAttachmentResolver;
