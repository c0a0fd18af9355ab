use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use trailsync_core::storage::{repository_error_to_status_code, RepositoryError};

/// Auth errors for the trailsync_auth crate.
///
/// Wraps the core `AuthError` and adds the I/O failures that can't live in
/// the functional core.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Error from the core auth module (credentials, lockout, validation).
    #[error(transparent)]
    Core(#[from] trailsync_core::auth::AuthError),

    /// User repository failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Authenticated, but not allowed to do this.
    #[error("forbidden")]
    Forbidden,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        use trailsync_core::auth::AuthError as CoreError;

        match self {
            AuthError::Core(core_err) => match core_err {
                CoreError::InvalidCredentials
                | CoreError::SessionNotFound
                | CoreError::SessionExpired => StatusCode::UNAUTHORIZED,
                CoreError::AccountLocked(_) => StatusCode::LOCKED,
                CoreError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                CoreError::InvalidUsername(_)
                | CoreError::InvalidPassword(_)
                | CoreError::InvalidState => StatusCode::BAD_REQUEST,
                CoreError::Hashing(_) | CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AuthError::Repository(e) => StatusCode::from_u16(repository_error_to_status_code(e))
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        use trailsync_core::auth::AuthError as CoreError;

        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "auth error");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut body = json!({ "error": message });
        if let AuthError::Core(CoreError::AccountLocked(until)) = &self {
            body["locked_until"] = json!(until);
        }

        let mut response = (status, Json(body)).into_response();
        if let AuthError::Core(CoreError::RateLimited(secs)) = &self {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trailsync_core::auth::AuthError as CoreError;

    #[test]
    fn status_codes() {
        let cases = [
            (CoreError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (
                CoreError::AccountLocked(chrono::Utc::now()),
                StatusCode::LOCKED,
            ),
            (CoreError::RateLimited(30), StatusCode::TOO_MANY_REQUESTS),
            (
                CoreError::InvalidPassword("short".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                CoreError::Hashing("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(AuthError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = AuthError::from(CoreError::RateLimited(42)).into_response();
        assert_eq!(response.headers()[RETRY_AFTER], "42");
    }

    #[test]
    fn repository_errors_use_shared_mapping() {
        let err = AuthError::from(RepositoryError::Timeout(500));
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }
}
