//! Postgres schema definitions and SQL query constants.
//!
//! Pure data, no I/O.

/// Statements creating all tables, run in order on startup.
pub const CREATE_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL,
        failed_login_attempts INTEGER NOT NULL DEFAULT 0,
        locked_until TIMESTAMPTZ,
        last_login_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS system_settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        is_secret BOOLEAN NOT NULL DEFAULT FALSE,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS oauth_connections (
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        provider TEXT NOT NULL,
        access_token TEXT NOT NULL,
        refresh_token TEXT,
        expires_at TIMESTAMPTZ,
        scope TEXT,
        external_account_id TEXT,
        account_name TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (user_id, provider)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activities (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        strava_id BIGINT NOT NULL,
        name TEXT NOT NULL,
        sport_type TEXT NOT NULL,
        start_date TIMESTAMPTZ NOT NULL,
        start_date_local TIMESTAMP,
        timezone TEXT,
        distance_m DOUBLE PRECISION NOT NULL DEFAULT 0,
        moving_time_s BIGINT NOT NULL DEFAULT 0,
        elapsed_time_s BIGINT NOT NULL DEFAULT 0,
        total_elevation_gain_m DOUBLE PRECISION NOT NULL DEFAULT 0,
        average_speed_mps DOUBLE PRECISION,
        max_speed_mps DOUBLE PRECISION,
        average_heartrate DOUBLE PRECISION,
        max_heartrate DOUBLE PRECISION,
        calories DOUBLE PRECISION,
        start_latlng DOUBLE PRECISION[],
        end_latlng DOUBLE PRECISION[],
        summary_polyline TEXT,
        raw JSONB NOT NULL DEFAULT 'null'::jsonb,
        imported_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        UNIQUE (user_id, strava_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_activities_user_start ON activities(user_id, start_date DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS import_logs (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        status TEXT NOT NULL,
        started_at TIMESTAMPTZ NOT NULL,
        finished_at TIMESTAMPTZ,
        pages_fetched INTEGER NOT NULL DEFAULT 0,
        activities_seen INTEGER NOT NULL DEFAULT 0,
        inserted INTEGER NOT NULL DEFAULT 0,
        updated INTEGER NOT NULL DEFAULT 0,
        failed INTEGER NOT NULL DEFAULT 0,
        error TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_import_logs_user_started ON import_logs(user_id, started_at DESC)",
];

pub const USER_COLUMNS: &str = "id, username, display_name, password_hash, role, \
    failed_login_attempts, locked_until, last_login_at, created_at, updated_at";

pub const CONNECTION_COLUMNS: &str = "user_id, provider, access_token, refresh_token, \
    expires_at, scope, external_account_id, account_name, created_at, updated_at";

pub const ACTIVITY_COLUMNS: &str = "id, user_id, strava_id, name, sport_type, start_date, \
    start_date_local, timezone, distance_m, moving_time_s, elapsed_time_s, \
    total_elevation_gain_m, average_speed_mps, max_speed_mps, average_heartrate, \
    max_heartrate, calories, start_latlng, end_latlng, summary_polyline, raw, \
    imported_at, updated_at";

pub const IMPORT_LOG_COLUMNS: &str = "id, user_id, status, started_at, finished_at, \
    pages_fetched, activities_seen, inserted, updated, failed, error";

/// Upsert keyed on `(user_id, strava_id)`. `xmax = 0` only for freshly
/// inserted rows.
pub const UPSERT_ACTIVITY: &str = r#"
INSERT INTO activities (
    id, user_id, strava_id, name, sport_type, start_date, start_date_local, timezone,
    distance_m, moving_time_s, elapsed_time_s, total_elevation_gain_m, average_speed_mps,
    max_speed_mps, average_heartrate, max_heartrate, calories, start_latlng, end_latlng,
    summary_polyline, raw, imported_at, updated_at
) VALUES (
    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19,
    $20, $21, $22, $23
)
ON CONFLICT (user_id, strava_id) DO UPDATE SET
    name = EXCLUDED.name,
    sport_type = EXCLUDED.sport_type,
    start_date = EXCLUDED.start_date,
    start_date_local = EXCLUDED.start_date_local,
    timezone = EXCLUDED.timezone,
    distance_m = EXCLUDED.distance_m,
    moving_time_s = EXCLUDED.moving_time_s,
    elapsed_time_s = EXCLUDED.elapsed_time_s,
    total_elevation_gain_m = EXCLUDED.total_elevation_gain_m,
    average_speed_mps = EXCLUDED.average_speed_mps,
    max_speed_mps = EXCLUDED.max_speed_mps,
    average_heartrate = EXCLUDED.average_heartrate,
    max_heartrate = EXCLUDED.max_heartrate,
    calories = EXCLUDED.calories,
    start_latlng = EXCLUDED.start_latlng,
    end_latlng = EXCLUDED.end_latlng,
    summary_polyline = EXCLUDED.summary_polyline,
    raw = EXCLUDED.raw,
    updated_at = EXCLUDED.updated_at
RETURNING (xmax = 0) AS inserted
"#;

pub const UPSERT_CONNECTION: &str = r#"
INSERT INTO oauth_connections (
    user_id, provider, access_token, refresh_token, expires_at, scope,
    external_account_id, account_name, created_at, updated_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
ON CONFLICT (user_id, provider) DO UPDATE SET
    access_token = EXCLUDED.access_token,
    refresh_token = EXCLUDED.refresh_token,
    expires_at = EXCLUDED.expires_at,
    scope = EXCLUDED.scope,
    external_account_id = EXCLUDED.external_account_id,
    account_name = EXCLUDED.account_name,
    updated_at = EXCLUDED.updated_at
"#;

pub const UPSERT_SETTING: &str = r#"
INSERT INTO system_settings (key, value, is_secret, updated_at)
VALUES ($1, $2, $3, $4)
ON CONFLICT (key) DO UPDATE SET
    value = EXCLUDED.value,
    is_secret = EXCLUDED.is_secret,
    updated_at = EXCLUDED.updated_at
"#;

/// Per-sport totals; the overall figures are summed in Rust.
pub const ACTIVITY_STATS_BY_SPORT: &str = r#"
SELECT sport_type,
       COUNT(*) AS count,
       COALESCE(SUM(distance_m), 0)::DOUBLE PRECISION AS distance_m,
       COALESCE(SUM(moving_time_s), 0)::BIGINT AS moving_time_s,
       COALESCE(SUM(total_elevation_gain_m), 0)::DOUBLE PRECISION AS elevation_gain_m,
       MIN(start_date) AS first_start,
       MAX(start_date) AS last_start
FROM activities
WHERE ($1::UUID IS NULL OR user_id = $1)
GROUP BY sport_type
"#;
