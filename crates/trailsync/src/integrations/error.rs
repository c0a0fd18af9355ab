use axum::http::StatusCode;
use thiserror::Error;
use trailsync_core::connection::OAuthProvider;

/// Bodies of failed vendor responses are cut to this many characters.
const MAX_ERROR_BODY: usize = 500;

/// Failures talking to Strava, Google or the chat completion API.
#[derive(Debug, Error)]
pub enum IntegrationError {
    /// Client id/secret or API key missing from settings and environment.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("{0} account is not connected")]
    NotConnected(OAuthProvider),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("{0} request timed out")]
    Timeout(&'static str),

    #[error("{service} API error ({status}): {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The vendor rejected the stored access token.
    #[error("{0} rejected the access token, reconnect the account")]
    Unauthorized(&'static str),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("OAuth error: {0}")]
    OAuth(String),
}

impl IntegrationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotConnected(_) => StatusCode::CONFLICT,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Http(_)
            | Self::Api { .. }
            | Self::Unauthorized(_)
            | Self::Decode(_)
            | Self::OAuth(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub(crate) fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(service)
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

/// Passes successful responses through and turns the rest into errors.
pub(crate) async fn check_response(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, IntegrationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(IntegrationError::Unauthorized(service));
    }

    let body = response.text().await.unwrap_or_default();
    Err(IntegrationError::Api {
        service,
        status: status.as_u16(),
        body: truncate(&body, MAX_ERROR_BODY),
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
