//! Access tokens that are valid right now.

use chrono::Utc;
use uuid::Uuid;

use trailsync_core::connection::{needs_refresh, OAuthConnection, OAuthProvider};

use crate::integrations::{IntegrationError, TokenGrant};
use crate::state::AppState;

/// Loads the user's connection, refreshing and storing a new token pair
/// first when the access token is about to expire.
///
/// # Errors
///
/// [`IntegrationError::NotConnected`] when the user never connected the
/// provider, [`IntegrationError::Unauthorized`] when a refresh is due but no
/// refresh token was stored.
pub async fn fresh_connection(
    state: &AppState,
    user_id: Uuid,
    provider: OAuthProvider,
) -> anyhow::Result<OAuthConnection> {
    let mut connection = state
        .connections
        .get_connection(user_id, provider)
        .await?
        .ok_or(IntegrationError::NotConnected(provider))?;

    let now = Utc::now();
    if !needs_refresh(&connection, now) {
        return Ok(connection);
    }

    let refresh_token = connection
        .refresh_token
        .clone()
        .ok_or(IntegrationError::Unauthorized(provider.label()))?;

    let grant = refresh(state, provider, &refresh_token).await?;
    if grant.scope.is_some() {
        connection.scope = grant.scope;
    }
    connection.apply_refresh(grant.access_token, grant.refresh_token, grant.expires_at, now);
    state.connections.upsert_connection(&connection).await?;

    tracing::info!(user_id = %user_id, provider = %provider, "refreshed access token");
    Ok(connection)
}

async fn refresh(
    state: &AppState,
    provider: OAuthProvider,
    refresh_token: &str,
) -> Result<TokenGrant, IntegrationError> {
    match provider {
        OAuthProvider::Strava => {
            let credentials = state.settings.strava_credentials().await?;
            let response = state.strava.refresh_token(&credentials, refresh_token).await?;
            Ok(response.grant())
        }
        OAuthProvider::GooglePhotos => {
            let credentials = state.settings.google_credentials().await?;
            state.google.refresh_token(&credentials, refresh_token).await
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;
    use trailsync_core::auth::Role;
    use trailsync_core::settings::{SystemSetting, STRAVA_CLIENT_ID, STRAVA_CLIENT_SECRET};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::Config;
    use crate::state::test_support::{add_user, test_state};

    async fn strava_state(server: &MockServer) -> AppState {
        let state = test_state(Config {
            strava_oauth_base: server.uri(),
            strava_api_base: server.uri(),
            ..Config::default()
        });
        for (key, value) in [(STRAVA_CLIENT_ID, "42"), (STRAVA_CLIENT_SECRET, "shh")] {
            state
                .settings_repo
                .upsert_setting(&SystemSetting::new(key, value))
                .await
                .unwrap();
        }
        state
    }

    #[tokio::test]
    async fn not_connected_is_an_error() {
        let state = test_state(Config::default());
        let user = add_user(&state, "alice", Role::User).await;

        let err = fresh_connection(&state, user.id, OAuthProvider::Strava)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IntegrationError>(),
            Some(IntegrationError::NotConnected(OAuthProvider::Strava))
        ));
    }

    #[tokio::test]
    async fn valid_token_is_returned_untouched() {
        let server = MockServer::start().await;
        let state = strava_state(&server).await;
        let user = add_user(&state, "alice", Role::User).await;

        let mut connection = OAuthConnection::new(user.id, OAuthProvider::Strava, "live");
        connection.expires_at = Some(Utc::now() + Duration::hours(3));
        state.connections.upsert_connection(&connection).await.unwrap();

        let fresh = fresh_connection(&state, user.id, OAuthProvider::Strava)
            .await
            .unwrap();
        assert_eq!(fresh.access_token, "live");
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_stored() {
        let server = MockServer::start().await;
        let expires_at = (Utc::now() + Duration::hours(6)).timestamp();
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "refresh_token": "new-refresh",
                "expires_at": expires_at,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let state = strava_state(&server).await;
        let user = add_user(&state, "alice", Role::User).await;

        let mut connection = OAuthConnection::new(user.id, OAuthProvider::Strava, "stale");
        connection.refresh_token = Some("old-refresh".to_string());
        connection.expires_at = Some(Utc::now() - Duration::minutes(5));
        state.connections.upsert_connection(&connection).await.unwrap();

        let fresh = fresh_connection(&state, user.id, OAuthProvider::Strava)
            .await
            .unwrap();
        assert_eq!(fresh.access_token, "new-access");
        assert_eq!(fresh.refresh_token.as_deref(), Some("new-refresh"));
        assert_eq!(fresh.expires_at.map(|t| t.timestamp()), Some(expires_at));

        let stored = state
            .connections
            .get_connection(user.id, OAuthProvider::Strava)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token, "new-access");
    }

    #[tokio::test]
    async fn expired_without_refresh_token_is_unauthorized() {
        let state = test_state(Config::default());
        let user = add_user(&state, "alice", Role::User).await;

        let mut connection = OAuthConnection::new(user.id, OAuthProvider::GooglePhotos, "stale");
        connection.expires_at = Some(Utc::now() - Duration::minutes(1));
        state.connections.upsert_connection(&connection).await.unwrap();

        let err = fresh_connection(&state, user.id, OAuthProvider::GooglePhotos)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IntegrationError>(),
            Some(IntegrationError::Unauthorized("Google Photos"))
        ));
    }
}
