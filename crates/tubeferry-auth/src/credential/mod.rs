//! Credential management.

pub mod manager;

pub use manager::CredentialManager;
