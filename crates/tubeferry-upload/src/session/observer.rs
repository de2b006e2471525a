//! Hooks through which the session manager reports its progress.

use async_trait::async_trait;

use tubeferry_core::result::AppResult;
use tubeferry_core::types::ByteRange;
use tubeferry_entity::session::UploadSession;

/// One observable step of an upload.
#[derive(Debug)]
pub enum UploadStep<'a> {
    /// A session was opened, freshly or after the previous one expired.
    SessionOpened {
        /// Current session state.
        session: &'a UploadSession,
        /// Whether this replaces an expired session.
        reopened: bool,
    },
    /// A chunk is about to be sent.
    ChunkSending {
        /// Range being sent.
        range: ByteRange,
    },
    /// The platform acknowledged more bytes.
    Acknowledged {
        /// Current session state.
        session: &'a UploadSession,
    },
    /// A request failed transiently and will be retried.
    Retrying {
        /// Failed attempt number (1-based).
        attempt: u32,
        /// Failure detail.
        reason: &'a str,
    },
    /// Every byte was sent; waiting for the video id.
    Verifying,
}

/// Receives upload steps, in order, for one job.
///
/// An error returned from the observer aborts the upload.
#[async_trait]
pub trait UploadObserver: Send + Sync {
    /// Handle one step.
    async fn on_step(&self, step: UploadStep<'_>) -> AppResult<()>;
}
