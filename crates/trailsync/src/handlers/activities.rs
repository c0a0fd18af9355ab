//! Activity listing, detail, deletion, route, photos and AI analysis.
//!
//! List and statistics reads fall back to demo data when the database read
//! fails and `MOCK_FALLBACK` is enabled; those responses carry `"mock": true`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trailsync_auth::CurrentUser;
use trailsync_core::activity::{compute_stats, Activity, ActivityStats, ActivitySummary};
use trailsync_core::chat::build_analysis_messages;
use trailsync_core::connection::OAuthProvider;
use trailsync_core::polyline::{self, Bounds, Coordinate, DEFAULT_PRECISION};
use trailsync_core::serde::{deserialize_optional_string, deserialize_optional_u32};
use trailsync_core::storage::{ActivityFilter, ActivityPage, DEFAULT_LIMIT, MAX_LIMIT};

use super::authz::require_activity_access;
use super::{ApiError, AppError};
use crate::integrations::google_photos::{photo_window, MediaItem};
use crate::integrations::openai::{TokenUsage, DEFAULT_TEMPERATURE};
use crate::mock_data::{fallback_activities, fallback_page};
use crate::services::fresh_connection;
use crate::state::AppState;

/// Query parameters for listing activities.
///
/// Browsers send blank inputs as empty strings; those count as unset.
#[derive(Debug, Default, Deserialize)]
pub struct ListActivitiesQuery {
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub sport_type: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`, inclusive.
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub from: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`, exclusive.
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub to: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub search: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_u32")]
    pub limit: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_optional_u32")]
    pub offset: Option<u32>,
}

impl ListActivitiesQuery {
    pub fn into_filter(self) -> Result<ActivityFilter, ApiError> {
        let filter = ActivityFilter {
            sport_type: self.sport_type,
            from: self.from.as_deref().map(parse_bound).transpose()?,
            to: self.to.as_deref().map(parse_bound).transpose()?,
            search: self.search,
            limit: self.limit.unwrap_or(DEFAULT_LIMIT),
            offset: self.offset.unwrap_or(0),
        };
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from >= to {
                return Err(ApiError::BadRequest("'from' must be before 'to'".to_string()));
            }
        }
        Ok(filter.normalized())
    }
}

/// Accepts a full timestamp or a plain date (midnight UTC).
fn parse_bound(value: &str) -> Result<DateTime<Utc>, ApiError> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ApiError::BadRequest(format!("invalid date: {value}")))
}

#[derive(Debug, Serialize)]
pub struct ActivityList {
    #[serde(flatten)]
    pub page: ActivityPage<ActivitySummary>,
    pub mock: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: ActivityStats,
    pub mock: bool,
}

/// A page of the user's activities; `true` when it came from demo data.
pub(crate) async fn load_activity_page(
    state: &AppState,
    user_id: Uuid,
    filter: &ActivityFilter,
) -> Result<(ActivityPage, bool), AppError> {
    match state.activities.list_activities(Some(user_id), filter).await {
        Ok(page) => Ok((page, false)),
        Err(e) if state.config.mock_fallback => {
            tracing::warn!(user_id = %user_id, error = %e, "activity read failed, serving demo data");
            Ok((fallback_page(user_id, filter), true))
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn load_activity_stats(
    state: &AppState,
    user_id: Uuid,
) -> Result<(ActivityStats, bool), AppError> {
    match state.activities.activity_stats(Some(user_id)).await {
        Ok(stats) => Ok((stats, false)),
        Err(e) if state.config.mock_fallback => {
            tracing::warn!(user_id = %user_id, error = %e, "stats read failed, serving demo data");
            Ok((compute_stats(&fallback_activities(user_id)), true))
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /api/activities
#[axum::debug_handler]
pub async fn list_activities(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<ListActivitiesQuery>,
) -> Result<Json<ActivityList>, AppError> {
    let filter = query.into_filter()?;
    let (page, mock) = load_activity_page(&state, user.id, &filter).await?;
    Ok(Json(ActivityList {
        page: page.map(|a| ActivitySummary::from(&a)),
        mock,
    }))
}

/// GET /api/stats
#[axum::debug_handler]
pub async fn stats(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, AppError> {
    let (stats, mock) = load_activity_stats(&state, user.id).await?;
    Ok(Json(StatsResponse { stats, mock }))
}

/// GET /api/activities/{id} - the full record, raw Strava JSON included.
#[axum::debug_handler]
pub async fn get_activity(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Activity>, AppError> {
    let activity = require_activity_access(&state, &user, id).await?;
    Ok(Json(activity))
}

/// DELETE /api/activities/{id}
#[axum::debug_handler]
pub async fn delete_activity(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_activity_access(&state, &user, id).await?;
    if !state.activities.delete_activity(id).await? {
        return Err(ApiError::NotFound("Activity").into());
    }
    tracing::info!(activity_id = %id, user_id = %user.id, "deleted activity");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BulkDeleteResponse {
    pub deleted: u64,
}

/// POST /api/activities/bulk-delete - only the caller's own activities go.
#[axum::debug_handler]
pub async fn bulk_delete(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(body): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, AppError> {
    if body.ids.is_empty() {
        return Err(ApiError::BadRequest("no activity ids given".to_string()).into());
    }
    if body.ids.len() > MAX_LIMIT as usize {
        return Err(
            ApiError::BadRequest(format!("at most {MAX_LIMIT} activities per request")).into(),
        );
    }

    let deleted = state.activities.delete_activities(user.id, &body.ids).await?;
    tracing::info!(
        user_id = %user.id,
        requested = body.ids.len(),
        deleted,
        "bulk deleted activities"
    );
    Ok(Json(BulkDeleteResponse { deleted }))
}

#[derive(Debug, Serialize)]
pub struct RouteResponse {
    pub activity_id: Uuid,
    pub points: Vec<Coordinate>,
    pub bounds: Option<Bounds>,
    pub geojson: serde_json::Value,
}

/// GET /api/activities/{id}/route - the decoded summary polyline.
#[axum::debug_handler]
pub async fn route(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RouteResponse>, AppError> {
    let activity = require_activity_access(&state, &user, id).await?;
    let encoded = activity
        .summary_polyline
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or(ApiError::NotFound("Route"))?;

    let points = polyline::decode(encoded, DEFAULT_PRECISION)?;
    Ok(Json(RouteResponse {
        activity_id: activity.id,
        bounds: polyline::bounds(&points),
        geojson: polyline::to_geojson_line(&points),
        points,
    }))
}

#[derive(Debug, Serialize)]
pub struct PhotosResponse {
    pub activity_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub photos: Vec<MediaItem>,
}

/// GET /api/activities/{id}/photos - Google Photos taken during the activity.
#[axum::debug_handler]
pub async fn photos(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PhotosResponse>, AppError> {
    let activity = require_activity_access(&state, &user, id).await?;
    let connection = fresh_connection(&state, user.id, OAuthProvider::GooglePhotos).await?;

    let photos = state
        .google
        .photos_for_activity(&connection.access_token, &activity)
        .await?;
    let (window_start, window_end) = photo_window(&activity);
    tracing::debug!(activity_id = %id, photos = photos.len(), "matched photos");

    Ok(Json(PhotosResponse {
        activity_id: activity.id,
        window_start,
        window_end,
        photos,
    }))
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub activity_id: Uuid,
    pub summary: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// POST /api/activities/{id}/analysis - a short AI summary of one activity.
#[axum::debug_handler]
pub async fn analysis(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let activity = require_activity_access(&state, &user, id).await?;
    let settings = state.settings.openai_settings().await?;

    let completion = state
        .openai
        .complete(
            &settings,
            &build_analysis_messages(&activity),
            DEFAULT_TEMPERATURE,
        )
        .await?;

    Ok(Json(AnalysisResponse {
        activity_id: activity.id,
        summary: completion.content,
        model: completion.model,
        usage: completion.usage,
    }))
}
