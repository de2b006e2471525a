//! Staged file entities.

pub mod model;

pub use model::StagedFile;
