//! Upload session state machine.

pub mod backoff;
pub mod manager;
pub mod observer;
pub mod reader;

pub use backoff::Backoff;
pub use manager::{UploadRequest, UploadSessionManager};
pub use observer::{UploadObserver, UploadStep};
pub use reader::ChunkReader;
