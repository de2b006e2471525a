//! Effective configuration display.

use tubeferry_core::config::AppConfig;
use tubeferry_core::result::AppResult;

use crate::output::{self, OutputFormat};

const REDACTED: &str = "****";

/// Execute the config command
pub fn execute(config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    let shown = redacted(config);
    match format {
        OutputFormat::Json => output::print_item(&shown, format),
        OutputFormat::Table => {
            println!("Effective configuration:");
            output::print_kv("Data root", &shown.staging.data_root);
            output::print_kv("Staging quota", &shown.staging.quota_bytes.to_string());
            output::print_kv("Max source size", &shown.source.max_source_bytes.to_string());
            output::print_kv("Chunk size", &shown.upload.chunk_size_bytes.to_string());
            output::print_kv("Chunk attempts", &shown.upload.chunk_attempts.to_string());
            output::print_kv("Max resumes", &shown.upload.max_resumes.to_string());
            output::print_kv(
                "Concurrency",
                &format!(
                    "{} global, {} per operator",
                    shown.queue.global_concurrency, shown.queue.per_operator_concurrency
                ),
            );
            output::print_kv("Default visibility", shown.upload.default_visibility.as_str());
            output::print_kv(
                "Chat attachments",
                if shown.chat.bot_token.is_some() { "enabled" } else { "disabled" },
            );
            let accounts: Vec<&str> = shown
                .oauth
                .accounts
                .iter()
                .map(|a| a.account_id.as_str())
                .collect();
            output::print_kv("Accounts", &accounts.join(", "));
            output::print_kv("Log", &format!("{} ({})", shown.logging.level, shown.logging.format));
        }
    }
    Ok(())
}

/// Copy of the configuration with every secret masked.
fn redacted(config: &AppConfig) -> AppConfig {
    let mut shown = config.clone();
    if !shown.oauth.client_secret.is_empty() {
        shown.oauth.client_secret = REDACTED.to_string();
    }
    for account in &mut shown.oauth.accounts {
        account.refresh_token = REDACTED.to_string();
        if account.access_token.is_some() {
            account.access_token = Some(REDACTED.to_string());
        }
    }
    if shown.chat.bot_token.is_some() {
        shown.chat.bot_token = Some(REDACTED.to_string());
    }
    shown
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubeferry_core::config::oauth::AccountSeed;

    #[test]
    fn secrets_are_masked() {
        let mut config = AppConfig::default();
        config.oauth.client_secret = "s3cret".into();
        config.chat.bot_token = Some("123:abc".into());
        config.oauth.accounts.push(AccountSeed {
            account_id: "main".into(),
            refresh_token: "1//refresh".into(),
            access_token: Some("ya29.token".into()),
            expires_at: None,
        });

        let shown = redacted(&config);
        let json = serde_json::to_string(&shown).unwrap();
        for secret in ["s3cret", "123:abc", "1//refresh", "ya29.token"] {
            assert!(!json.contains(secret), "{secret} leaked");
        }
        assert_eq!(shown.oauth.accounts[0].account_id, "main");
    }
}
