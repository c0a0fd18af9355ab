//! Google Photos: OAuth with PKCE through the `oauth2` crate, and the
//! media search used to find photos taken during an activity.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenResponse,
    TokenUrl,
};
use serde::{Deserialize, Serialize};

use trailsync_core::activity::Activity;

use super::{check_response, ClientCredentials, IntegrationError, TokenGrant};

const SERVICE: &str = "Google Photos";

pub const PHOTOS_SCOPE: &str = "https://www.googleapis.com/auth/photoslibrary.readonly";

/// Photos this long before the start or after the end still count.
pub const PHOTO_WINDOW_MARGIN_MINUTES: i64 = 30;

const SEARCH_PAGE_SIZE: u32 = 100;
const MAX_SEARCH_PAGES: usize = 5;

type GoogleOAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Where to send the browser, and the PKCE verifier to keep until the callback.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub pkce_verifier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    #[serde(default)]
    pub product_url: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub media_metadata: Option<MediaMetadata>,
}

impl MediaItem {
    pub fn creation_time(&self) -> Option<DateTime<Utc>> {
        self.media_metadata.as_ref().and_then(|m| m.creation_time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub width: Option<String>,
    #[serde(default)]
    pub height: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
    filters: SearchFilters,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchFilters {
    date_filter: DateFilter,
}

#[derive(Serialize)]
struct DateFilter {
    ranges: Vec<DateRange>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DateRange {
    start_date: ApiDate,
    end_date: ApiDate,
}

#[derive(Serialize)]
struct ApiDate {
    year: i32,
    month: u32,
    day: u32,
}

impl From<NaiveDate> for ApiDate {
    fn from(d: NaiveDate) -> Self {
        Self {
            year: d.year(),
            month: d.month(),
            day: d.day(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    media_items: Vec<MediaItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GooglePhotosClient {
    http: reqwest::Client,
    oauth_http: oauth2::reqwest::Client,
    auth_url: String,
    token_url: String,
    api_base: String,
}

impl GooglePhotosClient {
    pub fn new(http: reqwest::Client, auth_url: &str, token_url: &str, api_base: &str) -> Self {
        // The token endpoint must not redirect.
        let oauth_http = oauth2::reqwest::ClientBuilder::new()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default OAuth HTTP client");
                oauth2::reqwest::Client::new()
            });
        Self {
            http,
            oauth_http,
            auth_url: auth_url.to_string(),
            token_url: token_url.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn oauth_client(
        &self,
        credentials: &ClientCredentials,
        redirect_uri: Option<&str>,
    ) -> Result<GoogleOAuthClient, IntegrationError> {
        let client = BasicClient::new(ClientId::new(credentials.client_id.clone()))
            .set_client_secret(ClientSecret::new(credentials.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(self.auth_url.clone()).map_err(oauth_error)?)
            .set_token_uri(TokenUrl::new(self.token_url.clone()).map_err(oauth_error)?);

        match redirect_uri {
            Some(uri) => Ok(client.set_redirect_uri(
                RedirectUrl::new(uri.to_string()).map_err(oauth_error)?,
            )),
            None => Ok(client),
        }
    }

    /// Authorization URL asking for offline access, so a refresh token is issued.
    pub fn authorize_url(
        &self,
        credentials: &ClientCredentials,
        redirect_uri: &str,
        state: &str,
    ) -> Result<AuthorizationRequest, IntegrationError> {
        let client = self.oauth_client(credentials, Some(redirect_uri))?;
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let state = state.to_string();

        let (url, _csrf) = client
            .authorize_url(move || CsrfToken::new(state))
            .add_scope(Scope::new(PHOTOS_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(challenge)
            .url();

        Ok(AuthorizationRequest {
            url: url.to_string(),
            pkce_verifier: verifier.secret().to_string(),
        })
    }

    pub async fn exchange_code(
        &self,
        credentials: &ClientCredentials,
        redirect_uri: &str,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<TokenGrant, IntegrationError> {
        let client = self.oauth_client(credentials, Some(redirect_uri))?;
        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.oauth_http)
            .await
            .map_err(oauth_error)?;
        Ok(grant_from(&token, Utc::now()))
    }

    pub async fn refresh_token(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<TokenGrant, IntegrationError> {
        let client = self.oauth_client(credentials, None)?;
        let token = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.oauth_http)
            .await
            .map_err(oauth_error)?;
        Ok(grant_from(&token, Utc::now()))
    }

    /// Media items created on any day in `from..=to`, following
    /// `nextPageToken` for a bounded number of pages.
    pub async fn search_media_items(
        &self,
        access_token: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<MediaItem>, IntegrationError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_SEARCH_PAGES {
            let body = SearchRequest {
                page_size: SEARCH_PAGE_SIZE,
                page_token: page_token.as_deref(),
                filters: SearchFilters {
                    date_filter: DateFilter {
                        ranges: vec![DateRange {
                            start_date: from.into(),
                            end_date: to.into(),
                        }],
                    },
                },
            };

            let response = self
                .http
                .post(format!("{}/v1/mediaItems:search", self.api_base))
                .bearer_auth(access_token)
                .json(&body)
                .send()
                .await
                .map_err(|e| IntegrationError::from_reqwest(SERVICE, e))?;

            let page: SearchResponse = check_response(SERVICE, response)
                .await?
                .json()
                .await
                .map_err(|e| IntegrationError::Decode(e.to_string()))?;

            items.extend(page.media_items);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(items)
    }

    /// Photos taken during the activity, oldest first.
    pub async fn photos_for_activity(
        &self,
        access_token: &str,
        activity: &Activity,
    ) -> Result<Vec<MediaItem>, IntegrationError> {
        let (start, end) = photo_window(activity);
        // Google filters by calendar day in the photo's local time, so widen
        // the day range and filter precisely afterwards.
        let from = (start - Duration::days(1)).date_naive();
        let to = (end + Duration::days(1)).date_naive();
        let items = self.search_media_items(access_token, from, to).await?;
        Ok(photos_in_window(items, start, end))
    }
}

fn oauth_error(err: impl std::fmt::Display) -> IntegrationError {
    IntegrationError::OAuth(err.to_string())
}

fn grant_from(token: &BasicTokenResponse, now: DateTime<Utc>) -> TokenGrant {
    TokenGrant {
        access_token: token.access_token().secret().clone(),
        refresh_token: token.refresh_token().map(|t| t.secret().clone()),
        expires_at: token
            .expires_in()
            .and_then(|d| Duration::from_std(d).ok())
            .map(|d| now + d),
        scope: token.scopes().map(|scopes| {
            scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        }),
    }
}

/// Activity start minus the margin through its end plus the margin.
pub fn photo_window(activity: &Activity) -> (DateTime<Utc>, DateTime<Utc>) {
    let margin = Duration::minutes(PHOTO_WINDOW_MARGIN_MINUTES);
    (activity.start_date - margin, activity.end_date() + margin)
}

/// Keeps items created inside `start..=end`, sorted by creation time.
/// Items without a creation time are dropped.
pub fn photos_in_window(
    items: Vec<MediaItem>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<MediaItem> {
    let mut kept: Vec<MediaItem> = items
        .into_iter()
        .filter(|item| {
            item.creation_time()
                .is_some_and(|t| t >= start && t <= end)
        })
        .collect();
    kept.sort_by_key(|item| item.creation_time());
    kept
}
