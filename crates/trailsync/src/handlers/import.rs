//! Strava import endpoints.
//!
//! The import runs inside the request. Its route has a longer timeout than
//! the rest of the API; a client that gives up cancels the import.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use trailsync_auth::CurrentUser;
use trailsync_core::activity::{ImportLog, ImportRequest};

use super::AppError;
use crate::services::run_import;
use crate::state::AppState;

const DEFAULT_LOG_LIMIT: u32 = 20;
const MAX_LOG_LIMIT: u32 = 100;

/// POST /api/import - runs an import and returns the finished log.
#[axum::debug_handler]
pub async fn start_import(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportLog>, AppError> {
    let log = run_import(&state, user.id, request).await?;
    Ok(Json(log))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<u32>,
}

/// GET /api/import/logs - the caller's recent imports, newest first.
#[axum::debug_handler]
pub async fn import_logs(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<ImportLog>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_LOG_LIMIT);
    let logs = state.import_logs.list_import_logs(Some(user.id), limit).await?;
    Ok(Json(logs))
}
