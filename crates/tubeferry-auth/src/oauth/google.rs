//! Google OAuth 2.0 refresh-token grant.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::debug;

use tubeferry_core::config::oauth::OAuthConfig;
use tubeferry_core::error::{AppError, ErrorKind};
use tubeferry_core::result::AppResult;
use tubeferry_core::traits::oauth::OAuthAuthority;
use tubeferry_core::types::{AccessToken, TokenGrant};

/// Successful token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Lifetime in seconds.
    expires_in: i64,
}

/// Error response body.
#[derive(Debug, Default, Deserialize)]
struct TokenError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Exchanges refresh tokens at the Google token endpoint.
#[derive(Clone)]
pub struct GoogleOAuthClient {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    timeout: std::time::Duration,
}

impl std::fmt::Debug for GoogleOAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleOAuthClient")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl GoogleOAuthClient {
    /// Create a client from OAuth settings.
    pub fn new(client: reqwest::Client, config: &OAuthConfig) -> Self {
        Self {
            client,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            timeout: config.request_timeout(),
        }
    }
}

#[async_trait]
impl OAuthAuthority for GoogleOAuthClient {
    async fn refresh(&self, refresh_token: &str) -> AppResult<TokenGrant> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() {
                    "token endpoint timed out"
                } else {
                    "token endpoint unreachable"
                };
                AppError::with_source(ErrorKind::NetworkTransient, message, e)
            })?;

        let status = response.status();
        if status.is_success() {
            let body: TokenResponse = response.json().await?;
            debug!(expires_in = body.expires_in, "Token endpoint issued access token");
            return Ok(TokenGrant {
                access_token: AccessToken(body.access_token),
                expires_at: Utc::now() + Duration::seconds(body.expires_in),
            });
        }
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::network(format!("token endpoint returned {status}")));
        }

        let body: TokenError = response.json().await.unwrap_or_default();
        let detail = body
            .error_description
            .map(|d| format!("{}: {d}", body.error))
            .unwrap_or_else(|| body.error.clone());
        Err(match body.error.as_str() {
            "invalid_grant" => AppError::credential_revoked(format!(
                "refresh token rejected ({detail})"
            )),
            "invalid_client" | "unauthorized_client" => {
                AppError::configuration(format!("OAuth client rejected ({detail})"))
            }
            _ => AppError::platform_rejected(format!(
                "token endpoint returned {status} ({detail})"
            )),
        })
    }
}
