//! # tubeferry-upload
//!
//! Resumable upload engine for Tubeferry.
//!
//! ## Modules
//!
//! - `session` — the per-job upload state machine: session creation,
//!   the chunk loop, retry with backoff, resume from the platform's
//!   received range and session re-opening
//! - `platform` — the YouTube Data API resumable upload client

pub mod platform;
pub mod session;

pub use platform::YouTubeClient;
pub use session::{Backoff, ChunkReader, UploadObserver, UploadRequest, UploadSessionManager, UploadStep};
