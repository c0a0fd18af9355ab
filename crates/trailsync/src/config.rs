use std::{env, time::Duration};

use crate::storage::RetryPolicy;

/// Application configuration loaded from environment variables.
///
/// Integration credentials are not part of it: they live in the settings
/// table and fall back to the environment at lookup time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. In-memory storage is used when unset.
    pub database_url: Option<String>,
    /// Per-attempt database timeout in milliseconds (default: 5,000)
    pub db_timeout_ms: u64,
    /// Attempts per database call, first try included (default: 3)
    pub db_retry_attempts: u32,
    /// Pause between attempts in milliseconds (default: 200)
    pub db_retry_delay_ms: u64,
    /// Serve demo data when activity reads fail (default: false)
    pub mock_fallback: bool,
    /// Externally visible base URL, used to build OAuth redirect URIs.
    pub public_base_url: String,
    pub strava_api_base: String,
    pub strava_oauth_base: String,
    pub google_auth_url: String,
    pub google_token_url: String,
    pub google_photos_api_base: String,
    /// Used when neither the settings table nor `OPENAI_BASE_URL` has a value.
    pub openai_base_url: String,
    pub openai_model: String,
    /// Chat requests per user per minute (default: 20, 0 disables)
    pub chat_rate_limit: u32,
    /// Prior chat turns forwarded to the model (default: 10)
    pub chat_max_history: usize,
    /// Request timeout in seconds for everything except imports (default: 30)
    pub request_timeout_secs: u64,
    /// Request timeout in seconds for `POST /api/import` (default: 600)
    pub import_request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            db_timeout_ms: 5_000,
            db_retry_attempts: 3,
            db_retry_delay_ms: 200,
            mock_fallback: false,
            public_base_url: "http://localhost:3000".to_string(),
            strava_api_base: "https://www.strava.com/api/v3".to_string(),
            strava_oauth_base: "https://www.strava.com".to_string(),
            google_auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            google_token_url: "https://oauth2.googleapis.com/token".to_string(),
            google_photos_api_base: "https://photoslibrary.googleapis.com".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            chat_rate_limit: 20,
            chat_max_history: 10,
            request_timeout_secs: 30,
            import_request_timeout_secs: 600,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            db_timeout_ms: parse_env("DB_TIMEOUT_MS").unwrap_or(defaults.db_timeout_ms),
            db_retry_attempts: parse_env("DB_RETRY_ATTEMPTS")
                .unwrap_or(defaults.db_retry_attempts),
            db_retry_delay_ms: parse_env("DB_RETRY_DELAY_MS")
                .unwrap_or(defaults.db_retry_delay_ms),
            mock_fallback: env::var("MOCK_FALLBACK")
                .map(|v| parse_bool(&v))
                .unwrap_or(defaults.mock_fallback),
            public_base_url: string_env("PUBLIC_BASE_URL", defaults.public_base_url),
            strava_api_base: string_env("STRAVA_API_BASE", defaults.strava_api_base),
            strava_oauth_base: string_env("STRAVA_OAUTH_BASE", defaults.strava_oauth_base),
            google_auth_url: string_env("GOOGLE_AUTH_URL", defaults.google_auth_url),
            google_token_url: string_env("GOOGLE_TOKEN_URL", defaults.google_token_url),
            google_photos_api_base: string_env(
                "GOOGLE_PHOTOS_API_BASE",
                defaults.google_photos_api_base,
            ),
            openai_base_url: string_env("OPENAI_BASE_URL", defaults.openai_base_url),
            openai_model: string_env("OPENAI_MODEL", defaults.openai_model),
            chat_rate_limit: parse_env("CHAT_RATE_LIMIT").unwrap_or(defaults.chat_rate_limit),
            chat_max_history: parse_env("CHAT_MAX_HISTORY").unwrap_or(defaults.chat_max_history),
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS")
                .unwrap_or(defaults.request_timeout_secs),
            import_request_timeout_secs: parse_env("IMPORT_REQUEST_TIMEOUT_SECS")
                .unwrap_or(defaults.import_request_timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.db_retry_attempts.max(1),
            timeout: Duration::from_millis(self.db_timeout_ms),
            delay: Duration::from_millis(self.db_retry_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn import_request_timeout(&self) -> Duration {
        Duration::from_secs(self.import_request_timeout_secs)
    }

    /// Absolute URL for a path on this server.
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn string_env(name: &str, default: String) -> String {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
