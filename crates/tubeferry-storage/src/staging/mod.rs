//! Quota-tracked scratch storage for fetched source bytes.

pub mod checksum;
pub mod store;

pub use checksum::file_checksum;
pub use store::{StagingHandle, StagingStore};
