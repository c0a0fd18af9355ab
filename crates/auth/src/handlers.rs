//! HTTP handlers for auth routes.

use axum::{
    extract::{FromRequest, Request, State},
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trailsync_core::auth::{
    calculate_expiry, generate_session_id, is_locked, register_failed_login,
    register_successful_login, validate_password, validate_return_to, AuthError as CoreError,
    LoginFailureOutcome, Session, User,
};

use crate::error::AuthError;
use crate::extractors::{authenticate, session_id_from_headers, CurrentUser};
use crate::password::{hash_password, verify_password};
use crate::AuthState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Where a form login lands afterwards.
    #[serde(default)]
    pub return_to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Login body accepted as JSON or as an urlencoded form.
pub struct LoginInput {
    pub request: LoginRequest,
    pub is_json: bool,
}

impl<S> FromRequest<S> for LoginInput
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = is_json_content(req.headers());
        let request = if is_json {
            let Json(body) = Json::<LoginRequest>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            body
        } else {
            let Form(body) = Form::<LoginRequest>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            body
        };
        Ok(Self { request, is_json })
    }
}

fn is_json_content(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

fn accepts_json(headers: &HeaderMap) -> bool {
    is_json_content(headers)
        || headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"))
}

/// Creates the auth router.
///
/// Routes:
/// - `POST /auth/login` - Password login (JSON or form)
/// - `POST /auth/logout` - End current session
/// - `GET /auth/me` - Get current authenticated user
/// - `POST /auth/password` - Change password, ending other sessions
pub fn auth_routes() -> Router<AuthState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/auth/password", post(change_password))
}

async fn login(
    State(state): State<AuthState>,
    jar: CookieJar,
    input: LoginInput,
) -> Result<Response, AuthError> {
    let LoginInput { request, is_json } = input;
    let username = request.username.trim();
    let now = Utc::now();

    let limiter_key = format!("login:{}", username.to_lowercase());
    if let Err(retry_after) = state.login_limiter.check(&limiter_key) {
        tracing::warn!(username, "login rate limited");
        return Err(CoreError::RateLimited(retry_after).into());
    }

    let Some(mut user) = state.users.get_user_by_username(username).await? else {
        tracing::info!(username, "login for unknown user");
        return Err(CoreError::InvalidCredentials.into());
    };

    if is_locked(&user, now) {
        let until = user.locked_until.unwrap_or(now);
        return Err(CoreError::AccountLocked(until).into());
    }

    if !verify_password(&request.password, &user.password_hash).await? {
        let outcome = register_failed_login(&mut user, now, &state.config.lockout);
        state.users.update_user(&user).await?;
        return Err(match outcome {
            LoginFailureOutcome::Locked { until } => {
                tracing::warn!(username, %until, "account locked after failed logins");
                CoreError::AccountLocked(until)
            }
            LoginFailureOutcome::Counted { remaining } => {
                tracing::info!(username, remaining, "failed login");
                CoreError::InvalidCredentials
            }
        }
        .into());
    }

    register_successful_login(&mut user, now);
    state.users.update_user(&user).await?;
    state.login_limiter.reset(&limiter_key);

    let purged = state.sessions.purge_expired_sessions(now).await?;
    if purged > 0 {
        tracing::debug!(purged, "purged expired sessions");
    }

    let session = Session {
        id: generate_session_id(),
        user_id: user.id,
        created_at: now,
        expires_at: calculate_expiry(now, state.config.session_ttl_chrono()),
    };
    state.sessions.create_session(&session).await?;
    tracing::info!(user_id = %user.id, "user logged in");

    let jar = jar.add(session_cookie(&state, session.id.to_string()));

    if is_json {
        let body = LoginResponse {
            token: session.id.to_string(),
            expires_at: session.expires_at,
            user,
        };
        return Ok((jar, Json(body)).into_response());
    }

    let target = request
        .return_to
        .as_deref()
        .and_then(validate_return_to)
        .unwrap_or("/")
        .to_string();
    Ok((jar, Redirect::to(&target)).into_response())
}

fn session_cookie(state: &AuthState, value: String) -> Cookie<'static> {
    Cookie::build((state.config.cookie_name.clone(), value))
        .path("/")
        .http_only(true)
        .secure(state.config.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(
            state.config.session_ttl.as_secs() as i64
        ))
        .build()
}

async fn logout(
    State(state): State<AuthState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Response, AuthError> {
    if let Some(session_id) = session_id_from_headers(&headers, &state.config.cookie_name) {
        state.sessions.delete_session(&session_id).await?;
    }

    let jar = jar.remove(Cookie::build(state.config.cookie_name.clone()).path("/"));
    if accepts_json(&headers) {
        Ok((jar, StatusCode::NO_CONTENT).into_response())
    } else {
        Ok((jar, Redirect::to("/login")).into_response())
    }
}

async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

async fn change_password(
    State(state): State<AuthState>,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AuthError> {
    let (session, mut user) = authenticate(&state, &headers).await?;

    if !verify_password(&body.current_password, &user.password_hash).await? {
        return Err(CoreError::InvalidCredentials.into());
    }
    validate_password(&body.new_password)?;

    user.password_hash = hash_password(&body.new_password, state.config.bcrypt_cost).await?;
    user.updated_at = Utc::now();
    state.users.update_user(&user).await?;

    let ended = state
        .sessions
        .delete_user_sessions(user.id, Some(&session.id))
        .await?;
    tracing::info!(user_id = %user.id, ended, "password changed");

    Ok(StatusCode::NO_CONTENT)
}
