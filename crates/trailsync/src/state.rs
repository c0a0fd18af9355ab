//! Application state with repository-based storage.
//!
//! This module defines the shared application state that is passed to all
//! request handlers. Repositories are trait objects so the in-memory and
//! Postgres backends are interchangeable at startup.

use std::sync::Arc;

use axum::extract::FromRef;
use tokio::sync::broadcast;

use trailsync_auth::{AuthConfig, AuthState, InMemorySessionStore, RateLimiter};
use trailsync_core::auth::SessionRepository;
use trailsync_core::storage::{
    ActivityRepository, ConnectionRepository, HealthCheck, ImportLogRepository,
    SettingsRepository, UserRepository,
};

use crate::config::Config;
use crate::integrations::{http_client, GooglePhotosClient, OpenAiClient, StravaClient};
use crate::services::SettingsService;
use crate::storage::{InMemoryRepository, RetryingActivityRepository};

/// Window of the per-user chat rate limit.
const CHAT_RATE_WINDOW: std::time::Duration = std::time::Duration::from_secs(60);

/// A backend implementing every repository trait.
pub trait Backend:
    UserRepository
    + SettingsRepository
    + ConnectionRepository
    + ActivityRepository
    + ImportLogRepository
    + HealthCheck
    + 'static
{
}

impl<T> Backend for T where
    T: UserRepository
        + SettingsRepository
        + ConnectionRepository
        + ActivityRepository
        + ImportLogRepository
        + HealthCheck
        + 'static
{
}

/// Shared application state.
///
/// Cloned for each request handler; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserRepository>,
    pub settings_repo: Arc<dyn SettingsRepository>,
    pub connections: Arc<dyn ConnectionRepository>,
    /// Activity repository wrapped in the timeout/retry decorator.
    pub activities: Arc<dyn ActivityRepository>,
    pub import_logs: Arc<dyn ImportLogRepository>,
    pub health: Arc<dyn HealthCheck>,
    pub auth: AuthState,
    pub settings: SettingsService,
    pub strava: StravaClient,
    pub google: GooglePhotosClient,
    pub openai: OpenAiClient,
    pub chat_limiter: Arc<RateLimiter>,
    /// Shutdown signal for long-running requests such as imports.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Creates a new AppState over one storage backend and a session store.
    pub fn new<B: Backend>(
        backend: Arc<B>,
        sessions: Arc<dyn SessionRepository>,
        config: Config,
        auth_config: AuthConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let http = http_client();

        let users: Arc<dyn UserRepository> = backend.clone();
        let settings_repo: Arc<dyn SettingsRepository> = backend.clone();
        let activities: Arc<dyn ActivityRepository> = Arc::new(RetryingActivityRepository::new(
            backend.clone(),
            config.retry_policy(),
        ));

        Self {
            auth: AuthState::new(sessions, users.clone(), auth_config),
            settings: SettingsService::new(settings_repo.clone(), &config),
            strava: StravaClient::new(
                http.clone(),
                &config.strava_api_base,
                &config.strava_oauth_base,
            ),
            google: GooglePhotosClient::new(
                http.clone(),
                &config.google_auth_url,
                &config.google_token_url,
                &config.google_photos_api_base,
            ),
            openai: OpenAiClient::new(http),
            chat_limiter: Arc::new(RateLimiter::new(config.chat_rate_limit, CHAT_RATE_WINDOW)),
            users,
            settings_repo,
            connections: backend.clone(),
            activities,
            import_logs: backend.clone(),
            health: backend,
            config: Arc::new(config),
            shutdown_tx,
        }
    }

    /// State over the in-memory backend. Nothing survives a restart.
    pub fn in_memory(config: Config, auth_config: AuthConfig) -> Self {
        Self::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(InMemorySessionStore::new()),
            config,
            auth_config,
        )
    }

    /// State over Postgres: connects, creates the schema, then the session
    /// tables, which reference `users`.
    #[cfg(feature = "postgres")]
    pub async fn postgres(
        database_url: &str,
        config: Config,
        auth_config: AuthConfig,
    ) -> Result<Self, anyhow::Error> {
        use crate::storage::PostgresRepository;
        use trailsync_auth::PgSessionStore;

        let repo = PostgresRepository::connect(
            database_url,
            std::time::Duration::from_millis(config.db_timeout_ms),
        )
        .await?;
        repo.migrate().await?;

        let sessions = PgSessionStore::new(repo.pool().clone());
        sessions.migrate().await?;

        tracing::info!("connected to Postgres");
        Ok(Self::new(
            Arc::new(repo),
            Arc::new(sessions),
            config,
            auth_config,
        ))
    }

    /// Signal all long-running requests to stop.
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use trailsync_auth::{create_account, AuthConfig};
    use trailsync_core::auth::{Role, User};

    use super::*;

    pub const PASSWORD: &str = "correct-horse";

    pub fn auth_config() -> AuthConfig {
        AuthConfig {
            bcrypt_cost: 4,
            cookie_secure: false,
            ..AuthConfig::default()
        }
    }

    /// In-memory state whose settings never read the process environment.
    pub fn test_state(config: Config) -> AppState {
        let mut state = AppState::in_memory(config, auth_config());
        state.settings = state.settings.clone().with_env(|_| None);
        state
    }

    pub async fn add_user(state: &AppState, username: &str, role: Role) -> User {
        create_account(state.users.as_ref(), username, PASSWORD, role, 4)
            .await
            .unwrap()
    }
}
