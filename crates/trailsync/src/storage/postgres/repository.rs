//! Postgres repository implementation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use trailsync_core::activity::{Activity, ActivityStats, ImportLog, SportStats};
use trailsync_core::auth::User;
use trailsync_core::connection::{OAuthConnection, OAuthProvider};
use trailsync_core::settings::SystemSetting;
use trailsync_core::storage::{
    ActivityFilter, ActivityPage, ActivityRepository, ConnectionRepository, HealthCheck,
    ImportLogRepository, RepositoryError, Result, SettingsRepository, UpsertOutcome,
    UserRepository,
};

use super::conversions::{
    activity_from_row, connection_from_row, counter, import_log_from_row, setting_from_row,
    user_from_row,
};
use super::error::map_sqlx_error;
use super::schema::{
    ACTIVITY_COLUMNS, ACTIVITY_STATS_BY_SPORT, CONNECTION_COLUMNS, CREATE_TABLES,
    IMPORT_LOG_COLUMNS, UPSERT_ACTIVITY, UPSERT_CONNECTION, UPSERT_SETTING, USER_COLUMNS,
};

const MAX_CONNECTIONS: u32 = 10;

/// Postgres storage backend.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Connects a pool. `acquire_timeout` bounds how long a call waits for a
    /// free connection.
    pub async fn connect(database_url: &str, acquire_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| RepositoryError::ConnectionFailed(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates all tables and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<()> {
        for statement in CREATE_TABLES {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error(e, "schema"))?;
        }
        tracing::info!("database schema is up to date");
        Ok(())
    }
}

/// Escapes `%`, `_` and `\` for use inside an `ILIKE` pattern.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_activity_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    user_id: Option<Uuid>,
    filter: &ActivityFilter,
) {
    qb.push(" WHERE TRUE");
    if let Some(user_id) = user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(sport) = &filter.sport_type {
        qb.push(" AND LOWER(sport_type) = LOWER(")
            .push_bind(sport.clone())
            .push(")");
    }
    if let Some(from) = filter.from {
        qb.push(" AND start_date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND start_date < ").push_bind(to);
    }
    if let Some(search) = &filter.search {
        qb.push(" AND name ILIKE ")
            .push_bind(format!("%{}%", escape_like(search)));
    }
}

#[async_trait]
impl UserRepository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "User"))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "User"))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY username"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "User"))?;
        rows.iter().map(user_from_row).collect()
    }

    async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(counter(user.failed_login_attempts))
        .bind(user.locked_until)
        .bind(user.last_login_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match map_sqlx_error(e, "User") {
            RepositoryError::AlreadyExists { entity_type, .. } => RepositoryError::AlreadyExists {
                entity_type,
                id: user.username.clone(),
            },
            other => other,
        })?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                username = $2, display_name = $3, password_hash = $4, role = $5,
                failed_login_attempts = $6, locked_until = $7, last_login_at = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(counter(user.failed_login_attempts))
        .bind(user.locked_until)
        .bind(user.last_login_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "User"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("User", user.id));
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "User"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("User", id));
        }
        Ok(())
    }

    async fn count_users(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "User"))?;
        Ok(count as u64)
    }
}

#[async_trait]
impl SettingsRepository for PostgresRepository {
    async fn get_setting(&self, key: &str) -> Result<Option<SystemSetting>> {
        let row = sqlx::query(
            "SELECT key, value, is_secret, updated_at FROM system_settings WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "SystemSetting"))?;
        row.as_ref().map(setting_from_row).transpose()
    }

    async fn list_settings(&self) -> Result<Vec<SystemSetting>> {
        let rows = sqlx::query(
            "SELECT key, value, is_secret, updated_at FROM system_settings ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "SystemSetting"))?;
        rows.iter().map(setting_from_row).collect()
    }

    async fn upsert_setting(&self, setting: &SystemSetting) -> Result<()> {
        sqlx::query(UPSERT_SETTING)
            .bind(&setting.key)
            .bind(&setting.value)
            .bind(setting.is_secret)
            .bind(setting.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "SystemSetting"))?;
        Ok(())
    }

    async fn delete_setting(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM system_settings WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "SystemSetting"))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ConnectionRepository for PostgresRepository {
    async fn get_connection(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
    ) -> Result<Option<OAuthConnection>> {
        let row = sqlx::query(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM oauth_connections WHERE user_id = $1 AND provider = $2"
        ))
        .bind(user_id)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "OAuthConnection"))?;
        row.as_ref().map(connection_from_row).transpose()
    }

    async fn list_connections(&self, user_id: Uuid) -> Result<Vec<OAuthConnection>> {
        let rows = sqlx::query(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM oauth_connections WHERE user_id = $1 ORDER BY provider"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "OAuthConnection"))?;
        rows.iter().map(connection_from_row).collect()
    }

    async fn upsert_connection(&self, connection: &OAuthConnection) -> Result<()> {
        sqlx::query(UPSERT_CONNECTION)
            .bind(connection.user_id)
            .bind(connection.provider.as_str())
            .bind(&connection.access_token)
            .bind(&connection.refresh_token)
            .bind(connection.expires_at)
            .bind(&connection.scope)
            .bind(&connection.external_account_id)
            .bind(&connection.account_name)
            .bind(connection.created_at)
            .bind(connection.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "OAuthConnection"))?;
        Ok(())
    }

    async fn delete_connection(&self, user_id: Uuid, provider: OAuthProvider) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM oauth_connections WHERE user_id = $1 AND provider = $2")
                .bind(user_id)
                .bind(provider.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error(e, "OAuthConnection"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_connections(&self, provider: OAuthProvider) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM oauth_connections WHERE provider = $1")
                .bind(provider.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error(e, "OAuthConnection"))?;
        Ok(count as u64)
    }
}

#[async_trait]
impl ActivityRepository for PostgresRepository {
    async fn get_activity(&self, id: Uuid) -> Result<Option<Activity>> {
        let row = sqlx::query(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "Activity"))?;
        row.as_ref().map(activity_from_row).transpose()
    }

    async fn list_activities(
        &self,
        user_id: Option<Uuid>,
        filter: &ActivityFilter,
    ) -> Result<ActivityPage> {
        let filter = filter.clone().normalized();

        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM activities");
        push_activity_filter(&mut count_query, user_id, &filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "Activity"))?;

        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {ACTIVITY_COLUMNS} FROM activities"));
        push_activity_filter(&mut query, user_id, &filter);
        query
            .push(" ORDER BY start_date DESC, id LIMIT ")
            .push_bind(i64::from(filter.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(filter.offset));

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "Activity"))?;

        Ok(ActivityPage {
            items: rows.iter().map(activity_from_row).collect::<Result<_>>()?,
            total: total as u64,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    async fn upsert_activity(&self, activity: &Activity) -> Result<UpsertOutcome> {
        let inserted: bool = sqlx::query(UPSERT_ACTIVITY)
            .bind(activity.id)
            .bind(activity.user_id)
            .bind(activity.strava_id)
            .bind(&activity.name)
            .bind(&activity.sport_type)
            .bind(activity.start_date)
            .bind(activity.start_date_local)
            .bind(&activity.timezone)
            .bind(activity.distance_m)
            .bind(activity.moving_time_s)
            .bind(activity.elapsed_time_s)
            .bind(activity.total_elevation_gain_m)
            .bind(activity.average_speed_mps)
            .bind(activity.max_speed_mps)
            .bind(activity.average_heartrate)
            .bind(activity.max_heartrate)
            .bind(activity.calories)
            .bind(activity.start_latlng.map(|p| p.to_vec()))
            .bind(activity.end_latlng.map(|p| p.to_vec()))
            .bind(&activity.summary_polyline)
            .bind(&activity.raw)
            .bind(activity.imported_at)
            .bind(activity.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "Activity"))?
            .try_get("inserted")
            .map_err(|e| map_sqlx_error(e, "Activity"))?;

        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn delete_activity(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM activities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "Activity"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_activities(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM activities WHERE user_id = $1 AND id = ANY($2)")
            .bind(user_id)
            .bind(ids.to_vec())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "Activity"))?;
        Ok(result.rows_affected())
    }

    async fn latest_start_date(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar("SELECT MAX(start_date) FROM activities WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "Activity"))
    }

    async fn activity_stats(&self, user_id: Option<Uuid>) -> Result<ActivityStats> {
        let rows = sqlx::query(ACTIVITY_STATS_BY_SPORT)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "Activity"))?;

        let mut stats = ActivityStats::default();
        for row in &rows {
            let get_err = |e: sqlx::Error| map_sqlx_error(e, "Activity");
            let sport: String = row.try_get("sport_type").map_err(get_err)?;
            let count: i64 = row.try_get("count").map_err(get_err)?;
            let sport_stats = SportStats {
                count: count as u64,
                distance_m: row.try_get("distance_m").map_err(get_err)?,
                moving_time_s: row.try_get("moving_time_s").map_err(get_err)?,
                elevation_gain_m: row.try_get("elevation_gain_m").map_err(get_err)?,
            };
            let first: Option<DateTime<Utc>> = row.try_get("first_start").map_err(get_err)?;
            let last: Option<DateTime<Utc>> = row.try_get("last_start").map_err(get_err)?;

            stats.count += sport_stats.count;
            stats.total_distance_m += sport_stats.distance_m;
            stats.total_moving_time_s += sport_stats.moving_time_s;
            stats.total_elevation_gain_m += sport_stats.elevation_gain_m;
            stats.first_start = match (stats.first_start, first) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            stats.last_start = match (stats.last_start, last) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
            stats.by_sport.insert(sport, sport_stats);
        }
        Ok(stats)
    }

    async fn count_activities(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activities")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "Activity"))?;
        Ok(count as u64)
    }
}

#[async_trait]
impl ImportLogRepository for PostgresRepository {
    async fn create_import_log(&self, log: &ImportLog) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO import_logs ({IMPORT_LOG_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(log.id)
        .bind(log.user_id)
        .bind(log.status.as_str())
        .bind(log.started_at)
        .bind(log.finished_at)
        .bind(counter(log.pages_fetched))
        .bind(counter(log.activities_seen))
        .bind(counter(log.inserted))
        .bind(counter(log.updated))
        .bind(counter(log.failed))
        .bind(&log.error)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "ImportLog"))?;
        Ok(())
    }

    async fn update_import_log(&self, log: &ImportLog) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE import_logs SET
                status = $2, finished_at = $3, pages_fetched = $4, activities_seen = $5,
                inserted = $6, updated = $7, failed = $8, error = $9
            WHERE id = $1
            "#,
        )
        .bind(log.id)
        .bind(log.status.as_str())
        .bind(log.finished_at)
        .bind(counter(log.pages_fetched))
        .bind(counter(log.activities_seen))
        .bind(counter(log.inserted))
        .bind(counter(log.updated))
        .bind(counter(log.failed))
        .bind(&log.error)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "ImportLog"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("ImportLog", log.id));
        }
        Ok(())
    }

    async fn list_import_logs(&self, user_id: Option<Uuid>, limit: u32) -> Result<Vec<ImportLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {IMPORT_LOG_COLUMNS} FROM import_logs \
             WHERE ($1::UUID IS NULL OR user_id = $1) \
             ORDER BY started_at DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "ImportLog"))?;
        rows.iter().map(import_log_from_row).collect()
    }
}

#[async_trait]
impl HealthCheck for PostgresRepository {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "health"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("100%_run\\"), "100\\%\\_run\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn filter_builds_expected_sql() {
        let filter = ActivityFilter {
            sport_type: Some("Run".to_string()),
            search: Some("park".to_string()),
            ..ActivityFilter::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM activities");
        push_activity_filter(&mut qb, Some(Uuid::new_v4()), &filter);

        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM activities WHERE TRUE AND user_id = $1 \
             AND LOWER(sport_type) = LOWER($2) AND name ILIKE $3"
        );
    }
}
