//! Connecting and disconnecting Strava and Google Photos.
//!
//! The OAuth handshake state (CSRF token, PKCE verifier, return URL) is kept
//! in the session store under the `state` parameter and consumed by the
//! callback.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Redirect,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use trailsync_auth::CurrentUser;
use trailsync_core::auth::{
    generate_state, is_auth_flow_expired, validate_return_to, AuthFlowState, User,
};
use trailsync_core::connection::{ConnectionStatus, OAuthConnection, OAuthProvider};

use super::{ApiError, AppError};
use crate::state::AppState;

pub const STRAVA_CALLBACK_PATH: &str = "/connect/strava/callback";
pub const GOOGLE_CALLBACK_PATH: &str = "/connect/google-photos/callback";

const PROVIDERS: [OAuthProvider; 2] = [OAuthProvider::Strava, OAuthProvider::GooglePhotos];

/// GET /api/connections - one entry per provider, tokens never included.
#[axum::debug_handler]
pub async fn list_connections(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ConnectionStatus>>, AppError> {
    let connections = state.connections.list_connections(user.id).await?;
    let statuses = PROVIDERS
        .iter()
        .map(|provider| {
            connections
                .iter()
                .find(|c| c.provider == *provider)
                .map(ConnectionStatus::from)
                .unwrap_or_else(|| ConnectionStatus::disconnected(*provider))
        })
        .collect();
    Ok(Json(statuses))
}

/// DELETE /api/connections/{provider}
///
/// Strava is told to revoke the token first; a failure there is logged and
/// the local connection is removed anyway.
#[axum::debug_handler]
pub async fn disconnect(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<StatusCode, AppError> {
    let provider: OAuthProvider = provider.parse().map_err(ApiError::BadRequest)?;

    if provider == OAuthProvider::Strava {
        if let Some(connection) = state.connections.get_connection(user.id, provider).await? {
            if let Err(e) = state.strava.deauthorize(&connection.access_token).await {
                tracing::warn!(user_id = %user.id, error = %e, "Strava deauthorization failed");
            }
        }
    }

    if !state.connections.delete_connection(user.id, provider).await? {
        return Err(ApiError::NotFound("Connection").into());
    }
    tracing::info!(user_id = %user.id, provider = %provider, "disconnected account");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    pub return_to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub scope: Option<String>,
}

async fn begin_flow(
    state: &AppState,
    user: &User,
    provider: OAuthProvider,
    return_to: Option<String>,
    pkce_verifier: Option<String>,
    csrf: &str,
) -> Result<(), AppError> {
    let now = Utc::now();
    // Abandoned handshakes are never redeemed, so they are swept here.
    match state.auth.sessions.purge_expired_auth_flows(now).await {
        Ok(0) => {}
        Ok(purged) => tracing::debug!(purged, "purged expired OAuth flows"),
        Err(e) => tracing::warn!(error = %e, "failed to purge expired OAuth flows"),
    }

    let flow = AuthFlowState {
        user_id: user.id,
        provider,
        pkce_verifier,
        return_to: return_to.as_deref().and_then(validate_return_to).map(str::to_string),
        created_at: now,
    };
    state.auth.sessions.store_auth_flow(csrf, &flow).await?;
    tracing::debug!(user_id = %user.id, provider = %provider, "started OAuth flow");
    Ok(())
}

/// Consumes the stored handshake state and checks it belongs to this
/// user, provider and time window.
async fn finish_flow(
    state: &AppState,
    user: &User,
    provider: OAuthProvider,
    query: &CallbackQuery,
    now: DateTime<Utc>,
) -> Result<(AuthFlowState, String), AppError> {
    let csrf = query
        .state
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("missing state parameter".to_string()))?;
    let flow = state
        .auth
        .sessions
        .take_auth_flow(csrf)
        .await?
        .ok_or_else(|| ApiError::BadRequest("unknown or already used state".to_string()))?;

    if flow.provider != provider || flow.user_id != user.id {
        tracing::warn!(user_id = %user.id, provider = %provider, "OAuth state mismatch");
        return Err(ApiError::BadRequest("state does not match this request".to_string()).into());
    }
    if is_auth_flow_expired(&flow, now) {
        return Err(ApiError::BadRequest("authorization took too long, try again".to_string()).into());
    }
    if let Some(error) = &query.error {
        tracing::info!(user_id = %user.id, provider = %provider, error = %error, "authorization denied");
        return Err(ApiError::BadRequest(format!(
            "{} authorization was denied: {error}",
            provider.label()
        ))
        .into());
    }

    let code = query
        .code
        .clone()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing code parameter".to_string()))?;
    Ok((flow, code))
}

fn landing(flow: &AuthFlowState) -> Redirect {
    Redirect::to(flow.return_to.as_deref().unwrap_or("/"))
}

/// GET /connect/strava - redirects to Strava's consent screen.
#[axum::debug_handler]
pub async fn connect_strava(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
) -> Result<Redirect, AppError> {
    let credentials = state.settings.strava_credentials().await?;
    let csrf = generate_state();
    let url = state.strava.authorize_url(
        &credentials.client_id,
        &state.config.public_url(STRAVA_CALLBACK_PATH),
        &csrf,
    )?;

    begin_flow(&state, &user, OAuthProvider::Strava, query.return_to, None, &csrf).await?;
    Ok(Redirect::to(&url))
}

/// GET /connect/strava/callback
#[axum::debug_handler]
pub async fn strava_callback(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, AppError> {
    let now = Utc::now();
    let (flow, code) = finish_flow(&state, &user, OAuthProvider::Strava, &query, now).await?;

    let credentials = state.settings.strava_credentials().await?;
    let token = state.strava.exchange_code(&credentials, &code).await?;
    let grant = token.grant();

    let mut connection = OAuthConnection::new(user.id, OAuthProvider::Strava, grant.access_token);
    connection.refresh_token = grant.refresh_token;
    connection.expires_at = grant.expires_at;
    connection.scope = query.scope.clone().or(grant.scope);
    if let Some(athlete) = &token.athlete {
        connection.external_account_id = Some(athlete.id.to_string());
        connection.account_name = athlete.display_name();
    }
    state.connections.upsert_connection(&connection).await?;

    tracing::info!(
        user_id = %user.id,
        athlete_id = ?connection.external_account_id,
        "connected Strava account"
    );
    Ok(landing(&flow))
}

/// GET /connect/google-photos - redirects to Google's consent screen.
#[axum::debug_handler]
pub async fn connect_google(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
) -> Result<Redirect, AppError> {
    let credentials = state.settings.google_credentials().await?;
    let csrf = generate_state();
    let request = state.google.authorize_url(
        &credentials,
        &state.config.public_url(GOOGLE_CALLBACK_PATH),
        &csrf,
    )?;

    begin_flow(
        &state,
        &user,
        OAuthProvider::GooglePhotos,
        query.return_to,
        Some(request.pkce_verifier),
        &csrf,
    )
    .await?;
    Ok(Redirect::to(&request.url))
}

/// GET /connect/google-photos/callback
#[axum::debug_handler]
pub async fn google_callback(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, AppError> {
    let now = Utc::now();
    let (flow, code) =
        finish_flow(&state, &user, OAuthProvider::GooglePhotos, &query, now).await?;
    let verifier = flow
        .pkce_verifier
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("missing PKCE verifier".to_string()))?;

    let credentials = state.settings.google_credentials().await?;
    let grant = state
        .google
        .exchange_code(
            &credentials,
            &state.config.public_url(GOOGLE_CALLBACK_PATH),
            &code,
            verifier,
        )
        .await?;

    let mut connection =
        OAuthConnection::new(user.id, OAuthProvider::GooglePhotos, grant.access_token);
    connection.refresh_token = grant.refresh_token;
    connection.expires_at = grant.expires_at;
    connection.scope = grant.scope;
    state.connections.upsert_connection(&connection).await?;

    tracing::info!(user_id = %user.id, "connected Google Photos account");
    Ok(landing(&flow))
}
