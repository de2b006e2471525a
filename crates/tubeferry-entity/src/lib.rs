//! # tubeferry-entity
//!
//! Domain entity models for Tubeferry. Every struct in this crate is a
//! value owned by exactly one component: jobs by the queue, upload
//! sessions by the session manager, staged files by the staging store and
//! credentials by the credential manager. All entities derive `Debug`,
//! `Clone`, `Serialize` and `Deserialize` so the journal can persist them.

pub mod credential;
pub mod job;
pub mod session;
pub mod staging;

pub use tubeferry_core::types::{JobOutcome, JobState, VideoMetadata, Visibility};
