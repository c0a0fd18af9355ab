use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AuthError, AuthFlowState, Session, SessionId};

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Session storage abstraction.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Store a new session.
    async fn create_session(&self, session: &Session) -> Result<()>;

    /// Retrieve session by ID.
    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Delete a specific session.
    async fn delete_session(&self, id: &SessionId) -> Result<()>;

    /// Delete all sessions for a user, optionally keeping one.
    async fn delete_user_sessions(&self, user_id: Uuid, keep: Option<&SessionId>) -> Result<u64>;

    /// Remove sessions whose expiry is at or before `now`.
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Store OAuth handshake state under its CSRF token.
    async fn store_auth_flow(&self, state: &str, flow: &AuthFlowState) -> Result<()>;

    /// Retrieve and delete OAuth handshake state.
    async fn take_auth_flow(&self, state: &str) -> Result<Option<AuthFlowState>>;

    /// Remove handshakes started `AUTH_FLOW_TTL_MINUTES` or more before `now`.
    async fn purge_expired_auth_flows(&self, now: DateTime<Utc>) -> Result<u64>;
}
