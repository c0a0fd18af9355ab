use std::time::Duration;

use trailsync_core::auth::LockoutPolicy;

use crate::error::AuthError;

/// Complete auth configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub session_ttl: Duration,
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub lockout: LockoutPolicy,
    /// Login attempts allowed per username within `login_rate_window`.
    pub login_rate_limit: u32,
    pub login_rate_window: Duration,
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(168 * 60 * 60),
            cookie_name: "trailsync_session".to_string(),
            cookie_secure: true,
            lockout: LockoutPolicy::default(),
            login_rate_limit: 10,
            login_rate_window: Duration::from_secs(60),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl AuthConfig {
    /// Load from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SESSION_TTL_HOURS`: Session TTL in hours (default: 168)
    /// - `COOKIE_SECURE`: Whether to set secure flag on cookies (default: true)
    /// - `LOGIN_MAX_ATTEMPTS`: Failed logins before lockout (default: 5)
    /// - `LOGIN_LOCKOUT_MINUTES`: Lockout duration (default: 15)
    /// - `LOGIN_RATE_LIMIT`: Login attempts per window and username (default: 10)
    /// - `LOGIN_RATE_WINDOW_SECS`: Rate limit window (default: 60)
    /// - `BCRYPT_COST`: bcrypt work factor, 4..=31 (default: 12)
    ///
    /// # Errors
    ///
    /// Returns `Config` when a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, AuthError> {
        let defaults = Self::default();

        let session_ttl = env_parse::<u64>("SESSION_TTL_HOURS")?
            .map(|hours| Duration::from_secs(hours * 60 * 60))
            .unwrap_or(defaults.session_ttl);

        let cookie_secure = std::env::var("COOKIE_SECURE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.cookie_secure);

        let lockout = LockoutPolicy {
            max_failed_attempts: env_parse("LOGIN_MAX_ATTEMPTS")?
                .unwrap_or(defaults.lockout.max_failed_attempts),
            lockout_duration: env_parse::<i64>("LOGIN_LOCKOUT_MINUTES")?
                .map(chrono::Duration::minutes)
                .unwrap_or(defaults.lockout.lockout_duration),
        };

        let bcrypt_cost = env_parse("BCRYPT_COST")?.unwrap_or(defaults.bcrypt_cost);
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(AuthError::Config(format!(
                "BCRYPT_COST must be between 4 and 31, got {bcrypt_cost}"
            )));
        }

        Ok(Self {
            session_ttl,
            cookie_secure,
            lockout,
            login_rate_limit: env_parse("LOGIN_RATE_LIMIT")?.unwrap_or(defaults.login_rate_limit),
            login_rate_window: env_parse("LOGIN_RATE_WINDOW_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.login_rate_window),
            bcrypt_cost,
            ..defaults
        })
    }

    pub(crate) fn session_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl.as_secs() as i64)
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>, AuthError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| AuthError::Config(format!("{name}: {e}"))),
        _ => Ok(None),
    }
}
