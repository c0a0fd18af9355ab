use chrono::{DateTime, Duration, Utc};
use rand::{distr::Alphanumeric, Rng};

use super::{AuthFlowState, Session, SessionId};

/// Length of generated session tokens.
pub const SESSION_ID_LENGTH: usize = 48;

/// How long an OAuth handshake may take between redirect and callback.
pub const AUTH_FLOW_TTL_MINUTES: i64 = 10;

/// Generate a cryptographically random session ID.
pub fn generate_session_id() -> SessionId {
    let id: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LENGTH)
        .map(char::from)
        .collect();
    SessionId::new(id)
}

/// Generate a random state parameter for CSRF protection.
pub fn generate_state() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Check if a session has expired.
pub fn is_session_expired(session: &Session, now: DateTime<Utc>) -> bool {
    session.expires_at <= now
}

/// Calculate session expiry from creation time and TTL.
pub fn calculate_expiry(created_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    created_at + ttl
}

/// Check if an OAuth handshake is too old to be completed.
pub fn is_auth_flow_expired(flow: &AuthFlowState, now: DateTime<Utc>) -> bool {
    flow.created_at + Duration::minutes(AUTH_FLOW_TTL_MINUTES) <= now
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::OAuthProvider;
    use uuid::Uuid;

    fn session_expiring_at(expires_at: DateTime<Utc>) -> Session {
        Session {
            id: generate_session_id(),
            user_id: Uuid::new_v4(),
            created_at: expires_at - Duration::hours(1),
            expires_at,
        }
    }

    #[test]
    fn generate_session_id_produces_alphanumeric_token() {
        let id = generate_session_id();
        assert_eq!(id.as_str().len(), SESSION_ID_LENGTH);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generate_session_id_is_unique() {
        assert_ne!(generate_session_id(), generate_session_id());
    }

    #[test]
    fn generate_state_produces_32_char_string() {
        assert_eq!(generate_state().len(), 32);
    }

    #[test]
    fn is_session_expired_returns_false_for_future_expiry() {
        let now = Utc::now();
        assert!(!is_session_expired(
            &session_expiring_at(now + Duration::hours(1)),
            now
        ));
    }

    #[test]
    fn is_session_expired_returns_true_for_past_expiry() {
        let now = Utc::now();
        assert!(is_session_expired(
            &session_expiring_at(now - Duration::hours(1)),
            now
        ));
    }

    #[test]
    fn is_session_expired_returns_true_at_exact_expiry() {
        let now = Utc::now();
        assert!(is_session_expired(&session_expiring_at(now), now));
    }

    #[test]
    fn calculate_expiry_adds_ttl_to_created_at() {
        let created = Utc::now();
        let ttl = Duration::days(7);
        assert_eq!(calculate_expiry(created, ttl), created + ttl);
    }

    #[test]
    fn auth_flow_expires_after_ten_minutes() {
        let now = Utc::now();
        let mut flow = AuthFlowState {
            user_id: Uuid::new_v4(),
            provider: OAuthProvider::Strava,
            pkce_verifier: None,
            return_to: None,
            created_at: now - Duration::minutes(9),
        };
        assert!(!is_auth_flow_expired(&flow, now));

        flow.created_at = now - Duration::minutes(10);
        assert!(is_auth_flow_expired(&flow, now));
    }
}
