//! OAuth authority trait.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::TokenGrant;

/// Issues fresh access tokens in exchange for a refresh token.
#[async_trait]
pub trait OAuthAuthority: Send + Sync + std::fmt::Debug + 'static {
    /// Exchange `refresh_token` for a new access token.
    ///
    /// Fails with `CredentialRevoked` when the refresh token is rejected and
    /// `NetworkTransient` when the authority could not be reached.
    async fn refresh(&self, refresh_token: &str) -> AppResult<TokenGrant>;
}
