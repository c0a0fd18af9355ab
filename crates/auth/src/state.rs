//! Application state for auth.

use std::sync::Arc;

use trailsync_core::auth::SessionRepository;
use trailsync_core::storage::UserRepository;

use crate::config::AuthConfig;
use crate::rate_limit::RateLimiter;

/// Shared state for auth handlers and extractors.
///
/// Host applications expose it to the extractors with a
/// `FromRef<TheirState> for AuthState` impl.
#[derive(Clone)]
pub struct AuthState {
    pub sessions: Arc<dyn SessionRepository>,
    pub users: Arc<dyn UserRepository>,
    pub config: AuthConfig,
    pub login_limiter: Arc<RateLimiter>,
}

impl AuthState {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        users: Arc<dyn UserRepository>,
        config: AuthConfig,
    ) -> Self {
        let login_limiter = Arc::new(RateLimiter::new(
            config.login_rate_limit,
            config.login_rate_window,
        ));
        Self {
            sessions,
            users,
            config,
            login_limiter,
        }
    }
}
