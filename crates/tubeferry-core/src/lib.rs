//! # tubeferry-core
//!
//! Core crate for Tubeferry. Contains configuration schemas, typed
//! identifiers, the shared job vocabulary (states, outcomes, byte ranges),
//! job events, the collaborator traits for remote platforms, and the
//! unified error system.
//!
//! This crate has **no** internal dependencies on other Tubeferry crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
