//! Stored OAuth connections to third-party accounts.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tokens are refreshed this long before they actually expire.
pub const REFRESH_SKEW_SECONDS: i64 = 60;

/// Third-party services a user can connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthProvider {
    Strava,
    GooglePhotos,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strava => "strava",
            Self::GooglePhotos => "google_photos",
        }
    }

    /// Human readable name.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Strava => "Strava",
            Self::GooglePhotos => "Google Photos",
        }
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OAuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strava" => Ok(Self::Strava),
            "google_photos" | "google-photos" => Ok(Self::GooglePhotos),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Access/refresh token pair used to call a provider on a user's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthConnection {
    pub user_id: Uuid,
    pub provider: OAuthProvider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    /// Account identifier on the provider side (Strava athlete id, ...).
    pub external_account_id: Option<String>,
    pub account_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OAuthConnection {
    pub fn new(user_id: Uuid, provider: OAuthProvider, access_token: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            provider,
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
            external_account_id: None,
            account_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the token pair after a refresh. A provider that omits the
    /// refresh token keeps the previous one.
    pub fn apply_refresh(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        self.access_token = access_token;
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
        self.expires_at = expires_at;
        self.updated_at = now;
    }
}

/// Whether the stored access token should be refreshed before use.
///
/// Connections without an expiry never need a refresh.
pub fn needs_refresh(connection: &OAuthConnection, now: DateTime<Utc>) -> bool {
    match connection.expires_at {
        Some(expires_at) => expires_at <= now + Duration::seconds(REFRESH_SKEW_SECONDS),
        None => false,
    }
}

/// Token-free view of a connection for API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub provider: OAuthProvider,
    pub connected: bool,
    pub account_name: Option<String>,
    pub external_account_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    pub fn disconnected(provider: OAuthProvider) -> Self {
        Self {
            provider,
            connected: false,
            account_name: None,
            external_account_id: None,
            expires_at: None,
            scope: None,
            connected_at: None,
        }
    }
}

impl From<&OAuthConnection> for ConnectionStatus {
    fn from(conn: &OAuthConnection) -> Self {
        Self {
            provider: conn.provider,
            connected: true,
            account_name: conn.account_name.clone(),
            external_account_id: conn.external_account_id.clone(),
            expires_at: conn.expires_at,
            scope: conn.scope.clone(),
            connected_at: Some(conn.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection_expiring_at(expires_at: Option<DateTime<Utc>>) -> OAuthConnection {
        let mut conn = OAuthConnection::new(Uuid::new_v4(), OAuthProvider::Strava, "access");
        conn.expires_at = expires_at;
        conn
    }

    #[test]
    fn provider_parses_both_spellings() {
        assert_eq!("strava".parse(), Ok(OAuthProvider::Strava));
        assert_eq!("google_photos".parse(), Ok(OAuthProvider::GooglePhotos));
        assert_eq!("google-photos".parse(), Ok(OAuthProvider::GooglePhotos));
        assert!("garmin".parse::<OAuthProvider>().is_err());
    }

    #[test]
    fn no_expiry_never_needs_refresh() {
        assert!(!needs_refresh(&connection_expiring_at(None), Utc::now()));
    }

    #[test]
    fn token_inside_skew_window_needs_refresh() {
        let now = Utc::now();
        assert!(needs_refresh(
            &connection_expiring_at(Some(now + Duration::seconds(30))),
            now
        ));
        assert!(needs_refresh(
            &connection_expiring_at(Some(now - Duration::hours(1))),
            now
        ));
    }

    #[test]
    fn fresh_token_does_not_need_refresh() {
        let now = Utc::now();
        assert!(!needs_refresh(
            &connection_expiring_at(Some(now + Duration::hours(5))),
            now
        ));
    }

    #[test]
    fn apply_refresh_keeps_old_refresh_token_when_omitted() {
        let now = Utc::now();
        let mut conn = connection_expiring_at(Some(now));
        conn.refresh_token = Some("old-refresh".to_string());

        conn.apply_refresh("new-access".to_string(), None, Some(now), now);

        assert_eq!(conn.access_token, "new-access");
        assert_eq!(conn.refresh_token.as_deref(), Some("old-refresh"));
    }

    #[test]
    fn status_never_contains_tokens() {
        let conn = connection_expiring_at(None);
        let status = ConnectionStatus::from(&conn);
        let json = serde_json::to_string(&status).unwrap();
        assert!(!json.contains("access"));
        assert!(status.connected);
    }
}
