//! Unified application error types for Tubeferry.
//!
//! Every crate maps its internal failures into [`AppError`]. The
//! [`ErrorKind`] is what a job records when it reaches a terminal failure,
//! so the kinds double as the user-visible error taxonomy.

use std::fmt;
use thiserror::Error;

/// Error kind categorization used across the entire pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The source could not be reached (network, DNS, 4xx).
    SourceUnreachable,
    /// The source exceeds the configured maximum size.
    SourceTooLarge,
    /// The source link format is not recognized.
    SourceAmbiguous,
    /// The staging byte quota would be exceeded.
    QuotaExceeded,
    /// The remote platform rejected the access token twice in a row.
    AuthExpired,
    /// The refresh token itself was rejected; re-authorization is required.
    CredentialRevoked,
    /// The upload session expired and the platform cannot report what it received.
    SessionExpiredUnrecoverable,
    /// A transient network failure (connect error, timeout, 5xx).
    NetworkTransient,
    /// The job was canceled by its operator.
    Canceled,
    /// The remote platform refused the request for a non-auth reason.
    PlatformRejected,
    /// The requested resource was not found.
    NotFound,
    /// Input validation failed.
    Validation,
    /// The caller is not allowed to perform the action.
    Authorization,
    /// A conflicting operation is already in progress.
    Conflict,
    /// A local storage I/O error occurred.
    Storage,
    /// A configuration error occurred.
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// An internal error occurred.
    Internal,
}

impl ErrorKind {
    /// Whether the failure may be retried transparently.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkTransient)
    }

    /// Return the kind as a stable snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceUnreachable => "source_unreachable",
            Self::SourceTooLarge => "source_too_large",
            Self::SourceAmbiguous => "source_ambiguous",
            Self::QuotaExceeded => "quota_exceeded",
            Self::AuthExpired => "auth_expired",
            Self::CredentialRevoked => "credential_revoked",
            Self::SessionExpiredUnrecoverable => "session_expired_unrecoverable",
            Self::NetworkTransient => "network_transient",
            Self::Canceled => "canceled",
            Self::PlatformRejected => "platform_rejected",
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Authorization => "authorization",
            Self::Conflict => "conflict",
            Self::Storage => "storage",
            Self::Configuration => "configuration",
            Self::Serialization => "serialization",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unified application error used throughout Tubeferry.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether this error may be retried transparently.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Create a source-unreachable error.
    pub fn source_unreachable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SourceUnreachable, message)
    }

    /// Create a source-too-large error.
    pub fn source_too_large(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SourceTooLarge, message)
    }

    /// Create a source-ambiguous error.
    pub fn source_ambiguous(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SourceAmbiguous, message)
    }

    /// Create a quota-exceeded error.
    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QuotaExceeded, message)
    }

    /// Create an auth-expired error.
    pub fn auth_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthExpired, message)
    }

    /// Create a credential-revoked error.
    pub fn credential_revoked(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CredentialRevoked, message)
    }

    /// Create a session-expired-unrecoverable error.
    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionExpiredUnrecoverable, message)
    }

    /// Create a transient network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkTransient, message)
    }

    /// Create a canceled error.
    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Canceled, message)
    }

    /// Create a platform-rejected error.
    pub fn platform_rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PlatformRejected, message)
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create an authorization error.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Storage, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        // Anything that reaches here happened on the wire; status-bearing
        // responses are classified by the callers before conversion.
        let kind = if err.is_builder() {
            ErrorKind::Internal
        } else if err.is_decode() {
            ErrorKind::Serialization
        } else {
            ErrorKind::NetworkTransient
        };
        Self::with_source(kind, format!("HTTP error: {err}"), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_transient_is_retryable() {
        assert!(ErrorKind::NetworkTransient.is_retryable());
        assert!(!ErrorKind::AuthExpired.is_retryable());
        assert!(!ErrorKind::SourceUnreachable.is_retryable());
        assert!(!ErrorKind::Canceled.is_retryable());
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = AppError::quota_exceeded("staging is full");
        assert_eq!(err.to_string(), "quota_exceeded: staging is full");
    }

    #[test]
    fn clone_drops_source_but_keeps_kind() {
        let io = std::io::Error::other("disk gone");
        let err = AppError::from(io);
        let cloned = err.clone();
        assert_eq!(cloned.kind, ErrorKind::Storage);
        assert!(cloned.source.is_none());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::SessionExpiredUnrecoverable).unwrap();
        assert_eq!(json, "\"session_expired_unrecoverable\"");
    }
}
