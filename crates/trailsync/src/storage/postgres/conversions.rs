//! Row to domain type conversions.

use sqlx::postgres::PgRow;
use sqlx::Row;

use trailsync_core::activity::{Activity, ImportLog, ImportStatus};
use trailsync_core::auth::{Role, User};
use trailsync_core::connection::{OAuthConnection, OAuthProvider};
use trailsync_core::settings::SystemSetting;
use trailsync_core::storage::{RepositoryError, Result};

use super::error::map_sqlx_error;

fn get<'r, T>(row: &'r PgRow, column: &str, entity_type: &'static str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| map_sqlx_error(e, entity_type))
}

/// Counters are `INTEGER` columns.
fn get_u32(row: &PgRow, column: &str, entity_type: &'static str) -> Result<u32> {
    let value: i32 = get(row, column, entity_type)?;
    u32::try_from(value)
        .map_err(|_| RepositoryError::InvalidData(format!("negative {column}: {value}")))
}

fn latlng(value: Option<Vec<f64>>) -> Option<[f64; 2]> {
    match value.as_deref() {
        Some([lat, lng]) => Some([*lat, *lng]),
        _ => None,
    }
}

pub fn user_from_row(row: &PgRow) -> Result<User> {
    const E: &str = "User";
    let role: String = get(row, "role", E)?;
    Ok(User {
        id: get(row, "id", E)?,
        username: get(row, "username", E)?,
        display_name: get(row, "display_name", E)?,
        password_hash: get(row, "password_hash", E)?,
        role: role.parse::<Role>().map_err(RepositoryError::InvalidData)?,
        failed_login_attempts: get_u32(row, "failed_login_attempts", E)?,
        locked_until: get(row, "locked_until", E)?,
        last_login_at: get(row, "last_login_at", E)?,
        created_at: get(row, "created_at", E)?,
        updated_at: get(row, "updated_at", E)?,
    })
}

pub fn setting_from_row(row: &PgRow) -> Result<SystemSetting> {
    const E: &str = "SystemSetting";
    Ok(SystemSetting {
        key: get(row, "key", E)?,
        value: get(row, "value", E)?,
        is_secret: get(row, "is_secret", E)?,
        updated_at: get(row, "updated_at", E)?,
    })
}

pub fn connection_from_row(row: &PgRow) -> Result<OAuthConnection> {
    const E: &str = "OAuthConnection";
    let provider: String = get(row, "provider", E)?;
    Ok(OAuthConnection {
        user_id: get(row, "user_id", E)?,
        provider: provider
            .parse::<OAuthProvider>()
            .map_err(RepositoryError::InvalidData)?,
        access_token: get(row, "access_token", E)?,
        refresh_token: get(row, "refresh_token", E)?,
        expires_at: get(row, "expires_at", E)?,
        scope: get(row, "scope", E)?,
        external_account_id: get(row, "external_account_id", E)?,
        account_name: get(row, "account_name", E)?,
        created_at: get(row, "created_at", E)?,
        updated_at: get(row, "updated_at", E)?,
    })
}

pub fn activity_from_row(row: &PgRow) -> Result<Activity> {
    const E: &str = "Activity";
    Ok(Activity {
        id: get(row, "id", E)?,
        user_id: get(row, "user_id", E)?,
        strava_id: get(row, "strava_id", E)?,
        name: get(row, "name", E)?,
        sport_type: get(row, "sport_type", E)?,
        start_date: get(row, "start_date", E)?,
        start_date_local: get(row, "start_date_local", E)?,
        timezone: get(row, "timezone", E)?,
        distance_m: get(row, "distance_m", E)?,
        moving_time_s: get(row, "moving_time_s", E)?,
        elapsed_time_s: get(row, "elapsed_time_s", E)?,
        total_elevation_gain_m: get(row, "total_elevation_gain_m", E)?,
        average_speed_mps: get(row, "average_speed_mps", E)?,
        max_speed_mps: get(row, "max_speed_mps", E)?,
        average_heartrate: get(row, "average_heartrate", E)?,
        max_heartrate: get(row, "max_heartrate", E)?,
        calories: get(row, "calories", E)?,
        start_latlng: latlng(get(row, "start_latlng", E)?),
        end_latlng: latlng(get(row, "end_latlng", E)?),
        summary_polyline: get(row, "summary_polyline", E)?,
        raw: get(row, "raw", E)?,
        imported_at: get(row, "imported_at", E)?,
        updated_at: get(row, "updated_at", E)?,
    })
}

pub fn import_log_from_row(row: &PgRow) -> Result<ImportLog> {
    const E: &str = "ImportLog";
    let status: String = get(row, "status", E)?;
    Ok(ImportLog {
        id: get(row, "id", E)?,
        user_id: get(row, "user_id", E)?,
        status: status
            .parse::<ImportStatus>()
            .map_err(RepositoryError::InvalidData)?,
        started_at: get(row, "started_at", E)?,
        finished_at: get(row, "finished_at", E)?,
        pages_fetched: get_u32(row, "pages_fetched", E)?,
        activities_seen: get_u32(row, "activities_seen", E)?,
        inserted: get_u32(row, "inserted", E)?,
        updated: get_u32(row, "updated", E)?,
        failed: get_u32(row, "failed", E)?,
        error: get(row, "error", E)?,
    })
}

/// Counters are stored as `INTEGER`.
pub fn counter(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
