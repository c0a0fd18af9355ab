//! Administrator endpoints: system statistics, user management and system
//! settings. Every handler requires [`AdminUser`].

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trailsync_auth::{create_account, AdminUser};
use trailsync_core::activity::{ActivityStats, ImportLog};
use trailsync_core::auth::{unlock, Role, User};
use trailsync_core::connection::OAuthProvider;
use trailsync_core::settings::{validate_setting_key, SystemSetting, KNOWN_KEYS};

use super::{ApiError, AppError};
use crate::state::AppState;

const RECENT_IMPORTS: u32 = 10;

#[derive(Debug, Serialize)]
pub struct ConnectionCounts {
    pub strava: u64,
    pub google_photos: u64,
}

#[derive(Debug, Serialize)]
pub struct AdminStats {
    pub users: u64,
    pub activities: u64,
    pub connections: ConnectionCounts,
    pub activity_stats: ActivityStats,
    pub recent_imports: Vec<ImportLog>,
}

/// GET /api/admin/stats
#[axum::debug_handler]
pub async fn stats(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
) -> Result<Json<AdminStats>, AppError> {
    Ok(Json(AdminStats {
        users: state.users.count_users().await?,
        activities: state.activities.count_activities().await?,
        connections: ConnectionCounts {
            strava: state.connections.count_connections(OAuthProvider::Strava).await?,
            google_photos: state
                .connections
                .count_connections(OAuthProvider::GooglePhotos)
                .await?,
        },
        activity_stats: state.activities.activity_stats(None).await?,
        recent_imports: state.import_logs.list_import_logs(None, RECENT_IMPORTS).await?,
    }))
}

/// GET /api/admin/users
#[axum::debug_handler]
pub async fn list_users(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.users.list_users().await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// POST /api/admin/users
#[axum::debug_handler]
pub async fn create_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let role = match body.role.as_deref() {
        None | Some("") => Role::User,
        Some(role) => role.parse::<Role>().map_err(ApiError::BadRequest)?,
    };

    let mut user = create_account(
        state.users.as_ref(),
        &body.username,
        &body.password,
        role,
        state.auth.config.bcrypt_cost,
    )
    .await?;

    let display_name = body
        .display_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if let Some(name) = display_name {
        user.display_name = name;
        user.updated_at = Utc::now();
        state.users.update_user(&user).await?;
    }

    tracing::info!(admin = %admin.username, username = %user.username, "admin created user");
    Ok((StatusCode::CREATED, Json(user)))
}

/// DELETE /api/admin/users/{id} - removes the user, their data and sessions.
#[axum::debug_handler]
pub async fn delete_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if id == admin.id {
        return Err(ApiError::BadRequest("cannot delete your own account".to_string()).into());
    }

    state.users.delete_user(id).await?;
    let sessions = state.auth.sessions.delete_user_sessions(id, None).await?;
    tracing::info!(admin = %admin.username, user_id = %id, sessions, "admin deleted user");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/users/{id}/unlock - clears the failed-login lockout.
#[axum::debug_handler]
pub async fn unlock_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    let mut user = state
        .users
        .get_user(id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    unlock(&mut user, Utc::now());
    state.users.update_user(&user).await?;
    state
        .auth
        .login_limiter
        .reset(&format!("login:{}", user.username.to_lowercase()));

    tracing::info!(admin = %admin.username, username = %user.username, "admin unlocked user");
    Ok(Json(user))
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    /// Stored rows, secrets masked.
    pub settings: Vec<SystemSetting>,
    pub known_keys: Vec<&'static str>,
}

/// GET /api/admin/settings
#[axum::debug_handler]
pub async fn list_settings(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
) -> Result<Json<SettingsResponse>, AppError> {
    let settings = state
        .settings_repo
        .list_settings()
        .await?
        .iter()
        .map(SystemSetting::masked)
        .collect();
    Ok(Json(SettingsResponse {
        settings,
        known_keys: KNOWN_KEYS.to_vec(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SettingValue {
    pub value: String,
}

/// PUT /api/admin/settings/{key} - returns the stored row, masked.
#[axum::debug_handler]
pub async fn put_setting(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<SettingValue>,
) -> Result<Json<SystemSetting>, AppError> {
    validate_setting_key(&key).map_err(ApiError::BadRequest)?;
    let value = body.value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(
            "value must not be empty, delete the setting instead".to_string(),
        )
        .into());
    }

    let setting = SystemSetting::new(key, value);
    state.settings_repo.upsert_setting(&setting).await?;
    tracing::info!(admin = %admin.username, key = %setting.key, "admin updated setting");
    Ok(Json(setting.masked()))
}

/// DELETE /api/admin/settings/{key} - the environment value applies again.
#[axum::debug_handler]
pub async fn delete_setting(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, AppError> {
    validate_setting_key(&key).map_err(ApiError::BadRequest)?;
    if !state.settings_repo.delete_setting(&key).await? {
        return Err(ApiError::NotFound("Setting").into());
    }
    tracing::info!(admin = %admin.username, key = %key, "admin deleted setting");
    Ok(StatusCode::NO_CONTENT)
}
