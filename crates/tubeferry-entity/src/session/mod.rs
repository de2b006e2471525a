//! Resumable upload session entities.

pub mod model;

pub use model::UploadSession;
