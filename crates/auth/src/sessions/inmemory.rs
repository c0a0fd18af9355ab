//! In-memory session storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use trailsync_core::auth::{
    is_auth_flow_expired, AuthFlowState, Result, Session, SessionId, SessionRepository,
};

/// In-memory session store for development and testing.
///
/// Stores sessions and auth flow state in HashMaps wrapped in `Arc<RwLock<_>>`.
/// Data is not persisted and will be lost when the store is dropped.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    auth_flows: Arc<RwLock<HashMap<String, AuthFlowState>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionStore {
    async fn create_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.as_str().to_string(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(id.as_str()).cloned())
    }

    async fn delete_session(&self, id: &SessionId) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id.as_str());
        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: Uuid, keep: Option<&SessionId>) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, s| {
            s.user_id != user_id || keep.is_some_and(|k| k.as_str() == id.as_str())
        });
        Ok((before - sessions.len()) as u64)
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }

    async fn store_auth_flow(&self, state: &str, flow: &AuthFlowState) -> Result<()> {
        let mut flows = self.auth_flows.write().await;
        flows.insert(state.to_string(), flow.clone());
        Ok(())
    }

    async fn take_auth_flow(&self, state: &str) -> Result<Option<AuthFlowState>> {
        let mut flows = self.auth_flows.write().await;
        Ok(flows.remove(state))
    }

    async fn purge_expired_auth_flows(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut flows = self.auth_flows.write().await;
        let before = flows.len();
        flows.retain(|_, f| !is_auth_flow_expired(f, now));
        Ok((before - flows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use trailsync_core::connection::OAuthProvider;

    fn session(id: &str, user_id: Uuid, expires_at: DateTime<Utc>) -> Session {
        Session {
            id: SessionId::new(id.to_string()),
            user_id,
            created_at: expires_at - Duration::hours(24),
            expires_at,
        }
    }

    fn flow(provider: OAuthProvider) -> AuthFlowState {
        AuthFlowState {
            user_id: Uuid::new_v4(),
            provider,
            pkce_verifier: Some("test-verifier".to_string()),
            return_to: None,
            created_at: Utc::now(),
        }
    }

    fn id(s: &str) -> SessionId {
        SessionId::new(s.to_string())
    }

    #[tokio::test]
    async fn session_create_get_delete() {
        let store = InMemorySessionStore::new();
        let user = Uuid::new_v4();
        store
            .create_session(&session("s1", user, Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        let found = store.get_session(&id("s1")).await.unwrap().unwrap();
        assert_eq!(found.user_id, user);

        store.delete_session(&id("s1")).await.unwrap();
        assert!(store.get_session(&id("s1")).await.unwrap().is_none());

        // Deleting again is fine.
        assert!(store.delete_session(&id("s1")).await.is_ok());
    }

    #[tokio::test]
    async fn delete_user_sessions_can_keep_one() {
        let store = InMemorySessionStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let later = Utc::now() + Duration::hours(1);
        for (sid, user) in [("a1", alice), ("a2", alice), ("a3", alice), ("b1", bob)] {
            store.create_session(&session(sid, user, later)).await.unwrap();
        }

        let removed = store
            .delete_user_sessions(alice, Some(&id("a2")))
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert!(store.get_session(&id("a1")).await.unwrap().is_none());
        assert!(store.get_session(&id("a2")).await.unwrap().is_some());
        assert!(store.get_session(&id("b1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let store = InMemorySessionStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        store
            .create_session(&session("old", user, now - Duration::minutes(1)))
            .await
            .unwrap();
        store
            .create_session(&session("edge", user, now))
            .await
            .unwrap();
        store
            .create_session(&session("live", user, now + Duration::minutes(1)))
            .await
            .unwrap();

        assert_eq!(store.purge_expired_sessions(now).await.unwrap(), 2);
        assert!(store.get_session(&id("live")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn auth_flow_is_taken_once() {
        let store = InMemorySessionStore::new();
        store
            .store_auth_flow("state-abc", &flow(OAuthProvider::Strava))
            .await
            .unwrap();

        let taken = store.take_auth_flow("state-abc").await.unwrap().unwrap();
        assert_eq!(taken.provider, OAuthProvider::Strava);
        assert_eq!(taken.pkce_verifier.as_deref(), Some("test-verifier"));

        assert!(store.take_auth_flow("state-abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn auth_flow_overwrite_keeps_latest() {
        let store = InMemorySessionStore::new();
        store
            .store_auth_flow("same", &flow(OAuthProvider::Strava))
            .await
            .unwrap();
        store
            .store_auth_flow("same", &flow(OAuthProvider::GooglePhotos))
            .await
            .unwrap();

        let taken = store.take_auth_flow("same").await.unwrap().unwrap();
        assert_eq!(taken.provider, OAuthProvider::GooglePhotos);
    }

    #[tokio::test]
    async fn purge_drops_only_stale_auth_flows() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        let mut stale = flow(OAuthProvider::Strava);
        stale.created_at = now - Duration::minutes(11);
        let mut fresh = flow(OAuthProvider::GooglePhotos);
        fresh.created_at = now - Duration::minutes(2);
        store.store_auth_flow("stale", &stale).await.unwrap();
        store.store_auth_flow("fresh", &fresh).await.unwrap();

        assert_eq!(store.purge_expired_auth_flows(now).await.unwrap(), 1);
        assert!(store.take_auth_flow("stale").await.unwrap().is_none());
        assert!(store.take_auth_flow("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let store = InMemorySessionStore::new();
        let clone = store.clone();
        store
            .create_session(&session("s1", Uuid::new_v4(), Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        assert!(clone.get_session(&id("s1")).await.unwrap().is_some());
    }
}
