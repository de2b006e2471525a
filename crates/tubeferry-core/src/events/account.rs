//! Account-related events.

use serde::{Deserialize, Serialize};

use crate::types::id::AccountId;

/// Events related to an authorized remote account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccountEvent {
    /// The refresh token was rejected; jobs for this account are held.
    Revoked {
        /// The account ID.
        account_id: AccountId,
        /// Detail from the authority.
        reason: String,
    },
    /// The account was re-authorized; held jobs resume.
    Reauthorized {
        /// The account ID.
        account_id: AccountId,
    },
}
