//! GeoJSON for the map page.

use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::{json, Value};

use trailsync_auth::CurrentUser;
use trailsync_core::activity::Activity;
use trailsync_core::polyline::{self, Coordinate, DEFAULT_PRECISION};
use trailsync_core::storage::MAX_LIMIT;

use super::activities::{load_activity_page, ListActivitiesQuery};
use super::AppError;
use crate::state::AppState;

/// One LineString feature per activity with a decodable route.
///
/// Undecodable polylines are skipped, not fatal.
pub fn feature_collection(activities: &[Activity]) -> Value {
    let mut all_points: Vec<Coordinate> = Vec::new();
    let mut features = Vec::new();

    for activity in activities {
        let Some(encoded) = activity.summary_polyline.as_deref().filter(|p| !p.is_empty()) else {
            continue;
        };
        let points = match polyline::decode(encoded, DEFAULT_PRECISION) {
            Ok(points) if points.len() >= 2 => points,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(activity_id = %activity.id, error = %e, "skipping bad polyline");
                continue;
            }
        };

        features.push(json!({
            "type": "Feature",
            "geometry": polyline::to_geojson_line(&points),
            "properties": {
                "id": activity.id,
                "name": activity.name,
                "sport_type": activity.sport_type,
                "start_date": activity.start_date,
                "distance_m": activity.distance_m,
            },
        }));
        all_points.extend(points);
    }

    let bbox = polyline::bounds(&all_points).map(|b| {
        json!([
            b.south_west.lng,
            b.south_west.lat,
            b.north_east.lng,
            b.north_east.lat
        ])
    });

    let mut collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    if let Some(bbox) = bbox {
        collection["bbox"] = bbox;
    }
    collection
}

/// GET /api/map - the caller's routes, filtered like the activity list.
#[axum::debug_handler]
pub async fn map_data(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<ListActivitiesQuery>,
) -> Result<Json<Value>, AppError> {
    let mut filter = query.into_filter()?;
    if filter.offset == 0 {
        filter.limit = MAX_LIMIT;
    }
    let (page, mock) = load_activity_page(&state, user.id, &filter).await?;

    let mut collection = feature_collection(&page.items);
    collection["mock"] = Value::Bool(mock);
    Ok(Json(collection))
}
