//! Credential manager — token cache with per-account refresh serialization.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use tubeferry_core::config::oauth::OAuthConfig;
use tubeferry_core::error::{AppError, ErrorKind};
use tubeferry_core::result::AppResult;
use tubeferry_core::traits::oauth::OAuthAuthority;
use tubeferry_core::types::{AccessToken, AccountId};
use tubeferry_entity::credential::Credential;

/// Holds one credential per authorized account.
///
/// Each account's credential sits behind its own async mutex. A refresh
/// happens while that mutex is held, so concurrent callers for the same
/// account queue behind the refresh and reuse its result instead of
/// issuing a second one.
#[derive(Clone)]
pub struct CredentialManager {
    /// Credentials keyed by account.
    slots: Arc<DashMap<AccountId, Arc<Mutex<Credential>>>>,
    /// Accounts whose refresh token was rejected, with the reason.
    revoked: Arc<DashMap<AccountId, String>>,
    /// Token issuer.
    authority: Arc<dyn OAuthAuthority>,
    /// Minimum remaining validity for a cached token to be handed out.
    margin: Duration,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("accounts", &self.slots.len())
            .field("revoked", &self.revoked.len())
            .field("margin", &self.margin)
            .finish()
    }
}

impl CredentialManager {
    /// Create an empty manager.
    pub fn new(authority: Arc<dyn OAuthAuthority>, margin: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            revoked: Arc::new(DashMap::new()),
            authority,
            margin,
        }
    }

    /// Create a manager seeded with the configured accounts.
    pub fn from_config(authority: Arc<dyn OAuthAuthority>, config: &OAuthConfig) -> Self {
        let manager = Self::new(authority, Duration::seconds(config.expiry_margin_seconds));
        for seed in &config.accounts {
            manager.register(Credential::new(
                AccountId::new(seed.account_id.clone()),
                seed.refresh_token.clone(),
                seed.access_token.clone().map(AccessToken),
                seed.expires_at,
            ));
        }
        manager
    }

    /// Add or replace an account's credential.
    pub fn register(&self, credential: Credential) {
        let account_id = credential.account_id.clone();
        if credential.revoked {
            self.revoked
                .insert(account_id.clone(), "revoked before registration".into());
        } else {
            self.revoked.remove(&account_id);
        }
        self.slots
            .insert(account_id.clone(), Arc::new(Mutex::new(credential)));
        debug!(account_id = %account_id, "Credential registered");
    }

    /// Whether the account is known.
    pub fn contains(&self, account_id: &AccountId) -> bool {
        self.slots.contains_key(account_id)
    }

    /// All known accounts.
    pub fn accounts(&self) -> Vec<AccountId> {
        self.slots.iter().map(|e| e.key().clone()).collect()
    }

    /// Whether the account's refresh token has been rejected.
    pub fn is_revoked(&self, account_id: &AccountId) -> bool {
        self.revoked.contains_key(account_id)
    }

    /// Return a token valid for at least the safety margin.
    ///
    /// Refreshes first when the cached token is missing or about to expire.
    pub async fn get_valid_token(&self, account_id: &AccountId) -> AppResult<AccessToken> {
        let slot = self.slot(account_id)?;
        let mut credential = slot.lock().await;
        self.ensure_not_revoked(&credential)?;

        if let Some(token) = credential.usable_token(Utc::now(), self.margin) {
            return Ok(token.clone());
        }
        debug!(account_id = %account_id, "Access token near expiry; refreshing");
        self.refresh_locked(&mut credential).await
    }

    /// Refresh unconditionally, e.g. after the platform rejected a token.
    pub async fn force_refresh(&self, account_id: &AccountId) -> AppResult<AccessToken> {
        let slot = self.slot(account_id)?;
        let mut credential = slot.lock().await;
        self.ensure_not_revoked(&credential)?;
        self.refresh_locked(&mut credential).await
    }

    /// Refresh after `rejected` was refused, unless another caller already did.
    ///
    /// Several jobs may see the same token rejected at once. The first to
    /// take the lock refreshes; the rest find a different, still valid
    /// token and reuse it.
    pub async fn refresh_after_rejection(
        &self,
        account_id: &AccountId,
        rejected: &AccessToken,
    ) -> AppResult<AccessToken> {
        let slot = self.slot(account_id)?;
        let mut credential = slot.lock().await;
        self.ensure_not_revoked(&credential)?;

        if let Some(current) = credential.access_token.as_ref() {
            let still_valid = credential.expires_at.is_some_and(|at| at > Utc::now());
            if current != rejected && still_valid {
                debug!(account_id = %account_id, "Token already refreshed by another caller");
                return Ok(current.clone());
            }
        }
        self.refresh_locked(&mut credential).await
    }

    /// Install a new refresh token for a revoked or rotated account.
    pub async fn reauthorize(
        &self,
        account_id: &AccountId,
        refresh_token: impl Into<String>,
    ) -> AppResult<()> {
        let refresh_token = refresh_token.into();
        match self.slots.get(account_id).map(|s| Arc::clone(s.value())) {
            Some(slot) => {
                let mut credential = slot.lock().await;
                credential.refresh_token = refresh_token;
                credential.access_token = None;
                credential.expires_at = None;
                credential.revoked = false;
            }
            None => {
                self.slots.insert(
                    account_id.clone(),
                    Arc::new(Mutex::new(Credential::new(
                        account_id.clone(),
                        refresh_token,
                        None,
                        None,
                    ))),
                );
            }
        }
        self.revoked.remove(account_id);
        info!(account_id = %account_id, "Account re-authorized");
        Ok(())
    }

    fn slot(&self, account_id: &AccountId) -> AppResult<Arc<Mutex<Credential>>> {
        self.slots
            .get(account_id)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| AppError::not_found(format!("No credential for account {account_id}")))
    }

    fn ensure_not_revoked(&self, credential: &Credential) -> AppResult<()> {
        if credential.revoked {
            return Err(AppError::credential_revoked(format!(
                "Account {} must be re-authorized",
                credential.account_id
            )));
        }
        Ok(())
    }

    /// Exchange the refresh token. Caller holds the account's lock.
    async fn refresh_locked(&self, credential: &mut Credential) -> AppResult<AccessToken> {
        let account_id = credential.account_id.clone();
        match self.authority.refresh(&credential.refresh_token).await {
            Ok(grant) => {
                if grant.expires_at <= Utc::now() {
                    return Err(AppError::auth_expired(format!(
                        "Authority issued an already expired token for {account_id}"
                    )));
                }
                let token = grant.access_token.clone();
                credential.apply_grant(grant);
                info!(account_id = %account_id, expires_at = ?credential.expires_at, "Access token refreshed");
                Ok(token)
            }
            Err(e) if e.kind == ErrorKind::CredentialRevoked => {
                credential.revoked = true;
                credential.access_token = None;
                self.revoked.insert(account_id.clone(), e.message.clone());
                error!(account_id = %account_id, reason = %e.message, "Refresh token rejected; account revoked");
                Err(e)
            }
            Err(e) => {
                warn!(account_id = %account_id, error = %e, "Token refresh failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tubeferry_core::types::TokenGrant;

    /// Authority that counts calls and tracks concurrency.
    #[derive(Debug, Default)]
    struct CountingAuthority {
        calls: AtomicU32,
        in_flight: AtomicU32,
        max_in_flight: AtomicU32,
        revoke: bool,
    }

    #[async_trait]
    impl OAuthAuthority for CountingAuthority {
        async fn refresh(&self, _refresh_token: &str) -> AppResult<TokenGrant> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.revoke {
                return Err(AppError::credential_revoked("invalid_grant"));
            }
            Ok(TokenGrant {
                access_token: AccessToken(format!("token-{n}")),
                expires_at: Utc::now() + Duration::hours(1),
            })
        }
    }

    fn manager(authority: Arc<CountingAuthority>, expires_in: Option<Duration>) -> CredentialManager {
        let manager = CredentialManager::new(authority, Duration::minutes(5));
        manager.register(Credential::new(
            "acct".into(),
            "refresh",
            expires_in.map(|_| AccessToken::from("seed")),
            expires_in.map(|d| Utc::now() + d),
        ));
        manager
    }

    #[tokio::test]
    async fn fresh_token_is_returned_without_refresh() {
        let authority = Arc::new(CountingAuthority::default());
        let m = manager(authority.clone(), Some(Duration::hours(1)));
        let token = m.get_valid_token(&"acct".into()).await.unwrap();
        assert_eq!(token.secret(), "seed");
        assert_eq!(authority.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn token_inside_margin_is_refreshed_first() {
        let authority = Arc::new(CountingAuthority::default());
        let m = manager(authority.clone(), Some(Duration::minutes(2)));
        let token = m.get_valid_token(&"acct".into()).await.unwrap();
        assert_eq!(token.secret(), "token-1");
    }

    #[tokio::test]
    async fn concurrent_expiry_triggers_one_refresh() {
        let authority = Arc::new(CountingAuthority::default());
        let m = manager(authority.clone(), None);

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let m = m.clone();
            tasks.push(tokio::spawn(async move {
                m.get_valid_token(&"acct".into()).await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().secret(), "token-1");
        }
        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
        assert_eq!(authority.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_rejections_share_one_refresh() {
        let authority = Arc::new(CountingAuthority::default());
        let m = manager(authority.clone(), Some(Duration::hours(1)));
        let rejected = AccessToken::from("seed");

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let m = m.clone();
            let rejected = rejected.clone();
            tasks.push(tokio::spawn(async move {
                m.refresh_after_rejection(&"acct".into(), &rejected).await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().secret(), "token-1");
        }
        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_refresh_token_revokes_account_until_reauthorized() {
        let authority = Arc::new(CountingAuthority {
            revoke: true,
            ..Default::default()
        });
        let m = manager(authority.clone(), None);
        let account: AccountId = "acct".into();

        let err = m.get_valid_token(&account).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::CredentialRevoked);
        assert!(m.is_revoked(&account));

        let again = m.get_valid_token(&account).await.unwrap_err();
        assert_eq!(again.kind, ErrorKind::CredentialRevoked);
        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);

        m.reauthorize(&account, "new-refresh").await.unwrap();
        assert!(!m.is_revoked(&account));
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let m = CredentialManager::new(Arc::new(CountingAuthority::default()), Duration::minutes(5));
        let err = m.get_valid_token(&"nobody".into()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
