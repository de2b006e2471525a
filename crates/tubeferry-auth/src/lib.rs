//! # tubeferry-auth
//!
//! OAuth credential lifecycle for Tubeferry.
//!
//! ## Modules
//!
//! - `credential` — per-account token cache with serialized refresh
//! - `oauth` — refresh-token grant against the Google token endpoint

pub mod credential;
pub mod oauth;

pub use credential::CredentialManager;
pub use oauth::GoogleOAuthClient;
