//! Shared HTTP helpers for source requests.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::redirect::Policy;

use tubeferry_core::config::source::SourceConfig;
use tubeferry_core::error::{AppError, ErrorKind};
use tubeferry_core::result::AppResult;

/// Build the client used for all source downloads.
pub fn build_client(config: &SourceConfig) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(Policy::limited(config.max_redirects))
        .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| AppError::with_source(ErrorKind::Internal, "Failed to create HTTP client", e))
}

/// Map a non-success status to the fetch error taxonomy.
///
/// Timeouts, throttling and server errors are transient; every other
/// refusal means the source cannot be reached as given.
pub fn status_error(status: StatusCode, url: &str) -> AppError {
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        AppError::network(format!("{url} returned {status}"))
    } else {
        AppError::source_unreachable(format!("{url} returned {status}"))
    }
}

/// Map a transport error from sending a source request.
pub fn send_error(err: reqwest::Error, url: &str) -> AppError {
    if err.is_redirect() {
        AppError::with_source(
            ErrorKind::SourceUnreachable,
            format!("{url}: too many redirects"),
            err,
        )
    } else if err.is_builder() {
        AppError::with_source(
            ErrorKind::SourceAmbiguous,
            format!("{url} is not a valid link"),
            err,
        )
    } else {
        AppError::with_source(
            ErrorKind::NetworkTransient,
            format!("{url}: request failed: {err}"),
            err,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_unreachable_server_errors_transient() {
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, "u").kind,
            ErrorKind::SourceUnreachable
        );
        assert_eq!(
            status_error(StatusCode::FORBIDDEN, "u").kind,
            ErrorKind::SourceUnreachable
        );
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY, "u").kind,
            ErrorKind::NetworkTransient
        );
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "u").kind,
            ErrorKind::NetworkTransient
        );
    }
}
