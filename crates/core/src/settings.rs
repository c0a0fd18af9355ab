//! System settings: well-known keys, environment fallbacks and masking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STRAVA_CLIENT_ID: &str = "strava_client_id";
pub const STRAVA_CLIENT_SECRET: &str = "strava_client_secret";
pub const GOOGLE_CLIENT_ID: &str = "google_client_id";
pub const GOOGLE_CLIENT_SECRET: &str = "google_client_secret";
pub const OPENAI_API_KEY: &str = "openai_api_key";
pub const OPENAI_MODEL: &str = "openai_model";
pub const OPENAI_BASE_URL: &str = "openai_base_url";

/// Every key the application looks up, in display order.
pub const KNOWN_KEYS: [&str; 7] = [
    STRAVA_CLIENT_ID,
    STRAVA_CLIENT_SECRET,
    GOOGLE_CLIENT_ID,
    GOOGLE_CLIENT_SECRET,
    OPENAI_API_KEY,
    OPENAI_MODEL,
    OPENAI_BASE_URL,
];

/// A key/value row in the settings table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSetting {
    pub key: String,
    pub value: String,
    pub is_secret: bool,
    pub updated_at: DateTime<Utc>,
}

impl SystemSetting {
    /// Builds a row, flagging well-known secret keys automatically.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let is_secret = is_secret_key(&key);
        Self {
            key,
            value: value.into(),
            is_secret,
            updated_at: Utc::now(),
        }
    }

    /// Copy safe to show in the admin UI.
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        if copy.is_secret {
            copy.value = mask_secret(&copy.value);
        }
        copy
    }
}

/// Environment variable a settings key falls back to.
///
/// Unknown keys map to their upper-cased form.
pub fn env_var_for(key: &str) -> String {
    key.to_ascii_uppercase()
}

/// Secrets are masked on read and never logged.
pub fn is_secret_key(key: &str) -> bool {
    key.ends_with("_secret") || key.ends_with("_api_key") || key.ends_with("_token")
}

/// Keeps the last four characters of a secret.
///
/// ```
/// use trailsync_core::settings::mask_secret;
///
/// assert_eq!(mask_secret("sk-abcdef1234"), "****1234");
/// assert_eq!(mask_secret("abc"), "****");
/// ```
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

/// A non-empty database value wins, then a non-empty environment value.
pub fn resolve_setting(db: Option<&str>, env: Option<&str>) -> Option<String> {
    let pick = |v: Option<&str>| {
        v.map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    pick(db).or_else(|| pick(env))
}

/// Keys must be lowercase snake case so they map cleanly to env vars.
pub fn validate_setting_key(key: &str) -> Result<(), String> {
    if key.is_empty() || key.len() > 128 {
        return Err("key must be between 1 and 128 characters".to_string());
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err("key may only contain lowercase letters, digits and '_'".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_keys_map_to_env_vars() {
        assert_eq!(env_var_for(STRAVA_CLIENT_ID), "STRAVA_CLIENT_ID");
        assert_eq!(env_var_for(OPENAI_API_KEY), "OPENAI_API_KEY");
    }

    #[test]
    fn secret_detection() {
        assert!(is_secret_key(STRAVA_CLIENT_SECRET));
        assert!(is_secret_key(GOOGLE_CLIENT_SECRET));
        assert!(is_secret_key(OPENAI_API_KEY));
        assert!(!is_secret_key(STRAVA_CLIENT_ID));
        assert!(!is_secret_key(OPENAI_MODEL));
    }

    #[test]
    fn mask_handles_multibyte() {
        assert_eq!(mask_secret("ééééééé"), "****éééé");
        assert_eq!(mask_secret(""), "****");
    }

    #[test]
    fn database_wins_over_env() {
        assert_eq!(
            resolve_setting(Some("db"), Some("env")),
            Some("db".to_string())
        );
    }

    #[test]
    fn blank_database_value_falls_back_to_env() {
        assert_eq!(
            resolve_setting(Some("  "), Some("env")),
            Some("env".to_string())
        );
        assert_eq!(resolve_setting(None, Some("env")), Some("env".to_string()));
        assert_eq!(resolve_setting(None, Some("")), None);
    }

    #[test]
    fn masked_setting_hides_only_secrets() {
        let secret = SystemSetting::new(OPENAI_API_KEY, "sk-1234567890");
        let public = SystemSetting::new(OPENAI_MODEL, "gpt-4o-mini");

        assert_eq!(secret.masked().value, "****7890");
        assert_eq!(public.masked().value, "gpt-4o-mini");
    }

    #[test]
    fn key_validation() {
        assert!(validate_setting_key("strava_client_id").is_ok());
        assert!(validate_setting_key("Bad-Key").is_err());
        assert!(validate_setting_key("").is_err());
    }
}
