//! Clients for the third-party APIs: Strava, Google Photos and an
//! OpenAI-compatible chat completion endpoint.

mod error;
pub mod google_photos;
pub mod openai;
pub mod strava;

use std::time::Duration;

use chrono::{DateTime, Utc};

pub use error::IntegrationError;
pub(crate) use error::check_response;
pub use google_photos::GooglePhotosClient;
pub use openai::OpenAiClient;
pub use strava::StravaClient;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth application credentials resolved from settings.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"****")
            .finish()
    }
}

/// Tokens returned by a code exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

/// Shared HTTP client for vendor calls.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("trailsync/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default HTTP client");
            reqwest::Client::new()
        })
}
