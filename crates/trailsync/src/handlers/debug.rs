//! Configuration overview for administrators. Secrets are masked.

use axum::{extract::State, Json};
use serde::Serialize;

use trailsync_auth::AdminUser;

use crate::services::ResolvedSetting;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct IntegrationStatus {
    pub strava: bool,
    pub google_photos: bool,
    pub openai: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub database: bool,
    pub mock_fallback: bool,
    pub public_base_url: String,
    pub strava_api_base: String,
    pub google_photos_api_base: String,
    pub db_timeout_ms: u64,
    pub db_retry_attempts: u32,
    pub chat_rate_limit: u32,
    pub integrations: IntegrationStatus,
    pub settings: Vec<ResolvedSetting>,
}

/// GET /api/debug/config
#[axum::debug_handler]
pub async fn config(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
) -> Json<ConfigReport> {
    let settings = state.settings.describe().await;
    let config = &state.config;

    Json(ConfigReport {
        database: config.database_url.is_some(),
        mock_fallback: config.mock_fallback,
        public_base_url: config.public_base_url.clone(),
        strava_api_base: config.strava_api_base.clone(),
        google_photos_api_base: config.google_photos_api_base.clone(),
        db_timeout_ms: config.db_timeout_ms,
        db_retry_attempts: config.db_retry_attempts,
        chat_rate_limit: config.chat_rate_limit,
        integrations: IntegrationStatus {
            strava: state.settings.strava_credentials().await.is_ok(),
            google_photos: state.settings.google_credentials().await.is_ok(),
            openai: state.settings.openai_settings().await.is_ok(),
        },
        settings,
    })
}

