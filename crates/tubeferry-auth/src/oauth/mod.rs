//! OAuth authority clients.

pub mod google;

pub use google::GoogleOAuthClient;
