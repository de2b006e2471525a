//! Credential model.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tubeferry_core::types::{AccessToken, AccountId, TokenGrant};

/// One authorized remote identity.
///
/// Mutated only by the credential manager.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Remote account id.
    pub account_id: AccountId,
    /// Current access token, if one has been issued.
    pub access_token: Option<AccessToken>,
    /// Expiry of the access token.
    pub expires_at: Option<DateTime<Utc>>,
    /// Long-lived refresh token.
    pub refresh_token: String,
    /// Set when the refresh token was rejected.
    #[serde(default)]
    pub revoked: bool,
}

impl Credential {
    /// Create a credential that has not been used yet.
    pub fn new(
        account_id: AccountId,
        refresh_token: impl Into<String>,
        access_token: Option<AccessToken>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            account_id,
            access_token,
            expires_at,
            refresh_token: refresh_token.into(),
            revoked: false,
        }
    }

    /// The access token if it stays valid for at least `margin` after `now`.
    pub fn usable_token(&self, now: DateTime<Utc>, margin: Duration) -> Option<&AccessToken> {
        match (&self.access_token, self.expires_at) {
            (Some(token), Some(expires_at)) if expires_at - margin > now => Some(token),
            _ => None,
        }
    }

    /// Install a freshly issued token.
    pub fn apply_grant(&mut self, grant: TokenGrant) {
        self.access_token = Some(grant.access_token);
        self.expires_at = Some(grant.expires_at);
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("account_id", &self.account_id)
            .field("access_token", &self.access_token)
            .field("expires_at", &self.expires_at)
            .field("refresh_token", &"***")
            .field("revoked", &self.revoked)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expires_in: Duration) -> Credential {
        Credential::new(
            "acct".into(),
            "refresh",
            Some(AccessToken::from("tok")),
            Some(Utc::now() + expires_in),
        )
    }

    #[test]
    fn token_inside_margin_is_not_usable() {
        let c = credential(Duration::minutes(4));
        assert!(c.usable_token(Utc::now(), Duration::minutes(5)).is_none());
    }

    #[test]
    fn token_outside_margin_is_usable() {
        let c = credential(Duration::minutes(30));
        assert!(c.usable_token(Utc::now(), Duration::minutes(5)).is_some());
    }

    #[test]
    fn debug_hides_secrets() {
        let rendered = format!("{:?}", credential(Duration::minutes(30)));
        assert!(!rendered.contains("\"refresh\""));
        assert!(!rendered.contains("\"tok\""));
        assert!(rendered.contains("***"));
    }
}
