//! # tubeferry-storage
//!
//! Local persistence for Tubeferry: the quota-tracked staging store that
//! buffers source bytes between fetch and upload, the JSON job journal
//! used for restart recovery, and the reaper that purges staged files
//! whose job no longer exists.

pub mod journal;
pub mod reaper;
pub mod staging;

pub use journal::JobJournal;
pub use reaper::OrphanReaper;
pub use staging::{StagingHandle, StagingStore};
