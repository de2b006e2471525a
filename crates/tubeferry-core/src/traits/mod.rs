//! Contracts for the external collaborators the pipeline consumes.
//!
//! The traits are defined here in `tubeferry-core` and implemented by the
//! HTTP clients in `tubeferry-upload`, `tubeferry-auth`, and
//! `tubeferry-source`; `ProgressSink` is implemented by front ends.
//! Tests substitute in-memory fakes.

pub mod attachment;
pub mod oauth;
pub mod platform;
pub mod progress;

pub use attachment::{AttachmentResolver, ResolvedAttachment};
pub use oauth::OAuthAuthority;
pub use platform::VideoPlatform;
pub use progress::{ProgressSink, ProgressUpdate};
