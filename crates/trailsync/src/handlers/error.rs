use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use trailsync_core::chat::ChatError;
use trailsync_core::polyline::PolylineError;
use trailsync_core::storage::{repository_error_to_status_code, RepositoryError};

use crate::integrations::IntegrationError;

/// Request-level failures raised directly by handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("forbidden")]
    Forbidden,

    #[error("{0}")]
    Conflict(String),

    #[error("too many requests, retry in {0}s")]
    TooManyRequests(u64),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// Application error type that wraps `anyhow::Error`.
///
/// This allows using `?` on functions that return `Result<_, anyhow::Error>`
/// to automatically convert them into `Result<_, AppError>`. Known error
/// types are mapped to their status codes; anything else is a 500 whose
/// details are logged but not returned.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        if let Some(e) = self.0.downcast_ref::<ApiError>() {
            e.status_code()
        } else if let Some(e) = self.0.downcast_ref::<RepositoryError>() {
            StatusCode::from_u16(repository_error_to_status_code(e))
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        } else if let Some(e) = self.0.downcast_ref::<IntegrationError>() {
            e.status_code()
        } else if let Some(e) = self.0.downcast_ref::<trailsync_auth::AuthError>() {
            e.status_code()
        } else if self.0.downcast_ref::<ChatError>().is_some() {
            StatusCode::BAD_REQUEST
        } else if self.0.downcast_ref::<PolylineError>().is_some() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let this = match self.0.downcast::<trailsync_auth::AuthError>() {
            Ok(auth) => return auth.into_response(),
            Err(other) => AppError(other),
        };

        let status = this.status_code();
        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(error = ?this.0, "Application error");
            match this.0.downcast_ref::<IntegrationError>() {
                Some(e) => e.to_string(),
                None => "Internal server error".to_string(),
            }
        } else {
            tracing::debug!(error = %this.0, status = status.as_u16(), "request failed");
            this.0.to_string()
        };

        let mut response = (status, Json(json!({ "error": message }))).into_response();
        if let Some(ApiError::TooManyRequests(secs)) = this.0.downcast_ref::<ApiError>() {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use trailsync_core::connection::OAuthProvider;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn repository_not_found_is_404() {
        let response =
            AppError::from(RepositoryError::not_found("Activity", "abc")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await["error"],
            "Activity not found: abc"
        );
    }

    #[tokio::test]
    async fn integration_errors_keep_their_message() {
        let response =
            AppError::from(IntegrationError::NotConnected(OAuthProvider::Strava)).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = AppError::from(IntegrationError::Api {
            service: "OpenAI",
            status: 500,
            body: "upstream".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("upstream"));
    }

    #[tokio::test]
    async fn unknown_errors_are_hidden() {
        let response = AppError::from(anyhow::anyhow!("secret detail")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "Internal server error");
    }

    #[tokio::test]
    async fn rate_limit_sets_retry_after() {
        let response = AppError::from(ApiError::TooManyRequests(12)).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "12");
    }

    #[tokio::test]
    async fn auth_errors_use_their_own_response() {
        let response = AppError::from(trailsync_auth::AuthError::Forbidden).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn chat_validation_is_bad_request() {
        let response = AppError::from(ChatError::EmptyQuestion).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
