//! OAuth client configuration.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth client and account seeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// OAuth client id.
    #[serde(default)]
    pub client_id: String,
    /// OAuth client secret.
    #[serde(default)]
    pub client_secret: String,
    /// Token endpoint.
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Refresh when fewer than this many seconds of validity remain.
    #[serde(default = "default_margin")]
    pub expiry_margin_seconds: i64,
    /// Limit on one token endpoint request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Authorized accounts known at startup.
    #[serde(default)]
    pub accounts: Vec<AccountSeed>,
}

/// One authorized account as provided by the consent flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSeed {
    /// Remote account id.
    pub account_id: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
    /// Current access token, if one is cached.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Expiry of the cached access token.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_url: default_token_url(),
            expiry_margin_seconds: default_margin(),
            request_timeout_seconds: default_request_timeout(),
            accounts: Vec::new(),
        }
    }
}

impl OAuthConfig {
    /// Token endpoint request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_margin() -> i64 {
    300
}

fn default_request_timeout() -> u64 {
    30
}
