//! Chat platform configuration (attachment resolution only).

use serde::{Deserialize, Serialize};

/// Credentials for resolving chat attachments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Bot token; attachments cannot be resolved without it.
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Bot API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: default_api_base(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}
