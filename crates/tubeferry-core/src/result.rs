//! Convenience result type alias for Tubeferry.

use crate::error::AppError;

/// A specialized `Result` type for Tubeferry operations.
pub type AppResult<T> = Result<T, AppError>;
