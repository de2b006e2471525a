//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section, and every field carries a default so an empty file is valid.

pub mod chat;
pub mod logging;
pub mod oauth;
pub mod progress;
pub mod queue;
pub mod source;
pub mod staging;
pub mod upload;

use std::path::Path;

use serde::{Deserialize, Serialize};

use self::chat::ChatConfig;
use self::logging::LoggingConfig;
use self::oauth::OAuthConfig;
use self::progress::ProgressConfig;
use self::queue::QueueConfig;
use self::source::SourceConfig;
use self::staging::StagingConfig;
use self::upload::{CHUNK_ALIGNMENT, UploadConfig};

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Staging store settings.
    pub staging: StagingConfig,
    /// Source fetcher settings.
    pub source: SourceConfig,
    /// Resumable upload settings.
    pub upload: UploadConfig,
    /// OAuth client and accounts.
    pub oauth: OAuthConfig,
    /// Admission control settings.
    pub queue: QueueConfig,
    /// Progress reporting settings.
    pub progress: ProgressConfig,
    /// Chat attachment resolution settings.
    pub chat: ChatConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files under `config_dir`.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `TUBEFERRY_`.
    pub fn load(config_dir: impl AsRef<Path>, env: &str) -> Result<Self, AppError> {
        let dir = config_dir.as_ref();
        let default_path = dir.join("default");
        let env_path = dir.join(env);

        let config = config::Config::builder()
            .add_source(config::File::from(default_path).required(false))
            .add_source(config::File::from(env_path).required(false))
            .add_source(
                config::Environment::with_prefix("TUBEFERRY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        let chunk = self.upload.chunk_size_bytes;
        if chunk == 0 || chunk % CHUNK_ALIGNMENT != 0 {
            return Err(AppError::configuration(format!(
                "upload.chunk_size_bytes must be a positive multiple of {CHUNK_ALIGNMENT}, got {chunk}"
            )));
        }
        if self.upload.session_ttl_seconds <= self.upload.request_timeout_seconds {
            return Err(AppError::configuration(
                "upload.session_ttl_seconds must exceed upload.request_timeout_seconds",
            ));
        }
        if self.upload.request_timeout_seconds == 0 || self.oauth.request_timeout_seconds == 0 {
            return Err(AppError::configuration(
                "upload.request_timeout_seconds and oauth.request_timeout_seconds must be positive",
            ));
        }
        if self.upload.chunk_attempts == 0 {
            return Err(AppError::configuration("upload.chunk_attempts must be at least 1"));
        }
        if self.upload.backoff_base_ms > self.upload.backoff_max_ms {
            return Err(AppError::configuration(
                "upload.backoff_base_ms must not exceed upload.backoff_max_ms",
            ));
        }
        let n = self.queue.global_concurrency;
        let m = self.queue.per_operator_concurrency;
        if m == 0 || m > n {
            return Err(AppError::configuration(format!(
                "queue caps must satisfy 1 <= per_operator ({m}) <= global ({n})"
            )));
        }
        if self.source.fetch_attempts == 0 {
            return Err(AppError::configuration("source.fetch_attempts must be at least 1"));
        }
        if self.staging.quota_bytes == 0 {
            return Err(AppError::configuration("staging.quota_bytes must be positive"));
        }
        Ok(())
    }
}
