//! Postgres session storage implementation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use trailsync_core::auth::{
    AuthError, AuthFlowState, Result, Session, SessionId, SessionRepository,
    AUTH_FLOW_TTL_MINUTES,
};
use trailsync_core::connection::OAuthProvider;

/// Postgres-backed session storage.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

fn storage(e: sqlx::Error) -> AuthError {
    AuthError::Storage(e.to_string())
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the session tables. Expects the `users` table to exist.
    pub async fn migrate(&self) -> Result<()> {
        for statement in [
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at)",
            r#"
            CREATE TABLE IF NOT EXISTS auth_flows (
                state TEXT PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                provider TEXT NOT NULL,
                pkce_verifier TEXT,
                return_to TEXT,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage)?;
        }
        Ok(())
    }
}

fn flow_from_row(row: &sqlx::postgres::PgRow) -> Result<AuthFlowState> {
    let provider: String = row.try_get("provider").map_err(storage)?;
    Ok(AuthFlowState {
        user_id: row.try_get("user_id").map_err(storage)?,
        provider: provider
            .parse::<OAuthProvider>()
            .map_err(AuthError::Storage)?,
        pkce_verifier: row.try_get("pkce_verifier").map_err(storage)?,
        return_to: row.try_get("return_to").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
    })
}

#[async_trait]
impl SessionRepository for PgSessionStore {
    async fn create_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(session.id.as_str())
        .bind(session.user_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>> {
        let row = sqlx::query(
            "SELECT id, user_id, created_at, expires_at FROM sessions WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.map(|row| {
            Ok(Session {
                id: SessionId::new(row.try_get::<String, _>("id").map_err(storage)?),
                user_id: row.try_get("user_id").map_err(storage)?,
                created_at: row.try_get("created_at").map_err(storage)?,
                expires_at: row.try_get("expires_at").map_err(storage)?,
            })
        })
        .transpose()
    }

    async fn delete_session(&self, id: &SessionId) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: Uuid, keep: Option<&SessionId>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM sessions WHERE user_id = $1 AND ($2::TEXT IS NULL OR id <> $2)",
        )
        .bind(user_id)
        .bind(keep.map(SessionId::as_str))
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(result.rows_affected())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        Ok(result.rows_affected())
    }

    async fn store_auth_flow(&self, state: &str, flow: &AuthFlowState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO auth_flows (state, user_id, provider, pkce_verifier, return_to, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (state) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                provider = EXCLUDED.provider,
                pkce_verifier = EXCLUDED.pkce_verifier,
                return_to = EXCLUDED.return_to,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(state)
        .bind(flow.user_id)
        .bind(flow.provider.as_str())
        .bind(&flow.pkce_verifier)
        .bind(&flow.return_to)
        .bind(flow.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    async fn take_auth_flow(&self, state: &str) -> Result<Option<AuthFlowState>> {
        // DELETE ... RETURNING reads and removes in one statement, so a state
        // can only be redeemed once.
        let row = sqlx::query(
            r#"
            DELETE FROM auth_flows WHERE state = $1
            RETURNING user_id, provider, pkce_verifier, return_to, created_at
            "#,
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.as_ref().map(flow_from_row).transpose()
    }

    async fn purge_expired_auth_flows(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - Duration::minutes(AUTH_FLOW_TTL_MINUTES);
        let result = sqlx::query("DELETE FROM auth_flows WHERE created_at <= $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    /// Runs against `TEST_DATABASE_URL` inside a throwaway schema.
    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL pointing at a Postgres server"]
    async fn purge_drops_only_stale_auth_flows() {
        let url = std::env::var("TEST_DATABASE_URL").unwrap();
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .unwrap();
        let schema = format!("flows_{}", Uuid::new_v4().simple());
        for statement in [
            format!("CREATE SCHEMA {schema}"),
            format!("SET search_path TO {schema}"),
            "CREATE TABLE users (id UUID PRIMARY KEY)".to_string(),
        ] {
            sqlx::query(&statement).execute(&pool).await.unwrap();
        }
        let store = PgSessionStore::new(pool.clone());
        store.migrate().await.unwrap();

        let user_id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id) VALUES ($1)")
            .bind(user_id)
            .execute(&pool)
            .await
            .unwrap();

        let now = Utc::now();
        let flow = |minutes_ago: i64| AuthFlowState {
            user_id,
            provider: OAuthProvider::Strava,
            pkce_verifier: None,
            return_to: None,
            created_at: now - Duration::minutes(minutes_ago),
        };
        store.store_auth_flow("stale", &flow(11)).await.unwrap();
        store.store_auth_flow("fresh", &flow(2)).await.unwrap();

        let purged = store.purge_expired_auth_flows(now).await.unwrap();
        let stale = store.take_auth_flow("stale").await.unwrap();
        let fresh = store.take_auth_flow("fresh").await.unwrap();
        sqlx::query(&format!("DROP SCHEMA {schema} CASCADE"))
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(purged, 1);
        assert!(stale.is_none());
        assert!(fresh.is_some());
    }
}
