//! Axum extractors for authentication.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use trailsync_core::auth::{is_session_expired, AuthError as CoreError, Session, SessionId, User};

use crate::error::AuthError;
use crate::AuthState;

/// Reads the session token from `Authorization: Bearer` or the session cookie.
///
/// The header wins when both are present.
pub fn session_id_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<SessionId> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(token) = bearer {
        return Some(SessionId::new(token.to_string()));
    }

    CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|c| SessionId::new(c.value().to_string()))
}

/// Resolves the session and its user for a request.
///
/// Expired sessions are deleted on sight.
pub async fn authenticate(
    auth: &AuthState,
    headers: &HeaderMap,
) -> Result<(Session, User), AuthError> {
    let session_id = session_id_from_headers(headers, &auth.config.cookie_name)
        .ok_or(CoreError::SessionNotFound)?;

    let session = auth
        .sessions
        .get_session(&session_id)
        .await?
        .ok_or(CoreError::SessionNotFound)?;

    if is_session_expired(&session, Utc::now()) {
        auth.sessions.delete_session(&session.id).await?;
        return Err(CoreError::SessionExpired.into());
    }

    let user = auth
        .users
        .get_user(session.user_id)
        .await?
        .ok_or(CoreError::SessionNotFound)?;

    Ok((session, user))
}

/// Extractor for authenticated user. Returns 401 if not authenticated.
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthState::from_ref(state);
        let (_, user) = authenticate(&auth, &parts.headers).await?;
        Ok(CurrentUser(user))
    }
}

/// Extractor for optionally authenticated user. Returns None if not authenticated.
pub struct OptionalUser(pub Option<User>);

impl<S> FromRequestParts<S> for OptionalUser
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthState::from_ref(state);
        match authenticate(&auth, &parts.headers).await {
            Ok((_, user)) => Ok(OptionalUser(Some(user))),
            Err(AuthError::Core(_)) => Ok(OptionalUser(None)),
            Err(e) => {
                tracing::warn!(error = %e, "session lookup failed");
                Ok(OptionalUser(None))
            }
        }
    }
}

/// Extractor for administrators. 401 when anonymous, 403 for regular users.
pub struct AdminUser(pub User);

impl<S> FromRequestParts<S> for AdminUser
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AuthError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header::COOKIE, HeaderValue};

    #[test]
    fn bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer token-a"));
        headers.insert(COOKIE, HeaderValue::from_static("sid=token-b"));

        assert_eq!(
            session_id_from_headers(&headers, "sid").map(|s| s.to_string()),
            Some("token-a".to_string())
        );
    }

    #[test]
    fn cookie_is_used_without_header() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("other=1; sid=token-b"));

        assert_eq!(
            session_id_from_headers(&headers, "sid").map(|s| s.to_string()),
            Some("token-b".to_string())
        );
    }

    #[test]
    fn non_bearer_header_falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));

        assert!(session_id_from_headers(&headers, "sid").is_none());
    }
}
