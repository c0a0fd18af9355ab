//! Strava OAuth and activity API client.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use trailsync_core::activity::Activity;

use super::{check_response, ClientCredentials, IntegrationError, TokenGrant};

const SERVICE: &str = "Strava";

pub const STRAVA_SCOPES: &str = "read,activity:read_all";

#[derive(Debug, Clone, Deserialize)]
pub struct StravaAthlete {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
}

impl StravaAthlete {
    /// "First Last", falling back to the username.
    pub fn display_name(&self) -> Option<String> {
        let full = [self.firstname.as_deref(), self.lastname.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if full.is_empty() {
            self.username.clone()
        } else {
            Some(full)
        }
    }
}

/// Token endpoint response for both code exchange and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp.
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub athlete: Option<StravaAthlete>,
}

impl StravaTokenResponse {
    pub fn grant(&self) -> TokenGrant {
        TokenGrant {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self
                .expires_at
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            scope: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    api_base: String,
    oauth_base: String,
}

impl StravaClient {
    pub fn new(http: reqwest::Client, api_base: &str, oauth_base: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            oauth_base: oauth_base.trim_end_matches('/').to_string(),
        }
    }

    /// Browser redirect target that starts the authorization.
    pub fn authorize_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, IntegrationError> {
        let mut url = Url::parse(&format!("{}/oauth/authorize", self.oauth_base))
            .map_err(|e| IntegrationError::OAuth(format!("invalid Strava OAuth base: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("approval_prompt", "auto")
            .append_pair("scope", STRAVA_SCOPES)
            .append_pair("state", state);
        Ok(url.to_string())
    }

    pub async fn exchange_code(
        &self,
        credentials: &ClientCredentials,
        code: &str,
    ) -> Result<StravaTokenResponse, IntegrationError> {
        self.token_request(&[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    pub async fn refresh_token(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<StravaTokenResponse, IntegrationError> {
        self.token_request(&[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
    ) -> Result<StravaTokenResponse, IntegrationError> {
        let response = self
            .http
            .post(format!("{}/oauth/token", self.oauth_base))
            .form(form)
            .send()
            .await
            .map_err(|e| IntegrationError::from_reqwest(SERVICE, e))?;

        check_response(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| IntegrationError::Decode(e.to_string()))
    }

    /// One page of the athlete's activities, newest first. Items are kept as
    /// raw JSON so nothing Strava sends is lost.
    pub async fn list_activities(
        &self,
        access_token: &str,
        page: u32,
        per_page: u32,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<serde_json::Value>, IntegrationError> {
        let mut query = vec![
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        if let Some(after) = after {
            query.push(("after", after.timestamp().to_string()));
        }
        if let Some(before) = before {
            query.push(("before", before.timestamp().to_string()));
        }

        let response = self
            .http
            .get(format!("{}/athlete/activities", self.api_base))
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await
            .map_err(|e| IntegrationError::from_reqwest(SERVICE, e))?;

        check_response(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| IntegrationError::Decode(e.to_string()))
    }

    /// Revokes the application's access for this athlete.
    pub async fn deauthorize(&self, access_token: &str) -> Result<(), IntegrationError> {
        let response = self
            .http
            .post(format!("{}/oauth/deauthorize", self.oauth_base))
            .form(&[("access_token", access_token)])
            .send()
            .await
            .map_err(|e| IntegrationError::from_reqwest(SERVICE, e))?;
        check_response(SERVICE, response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct StravaActivity {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sport_type: Option<String>,
    #[serde(rename = "type", default)]
    activity_type: Option<String>,
    start_date: DateTime<Utc>,
    /// Strava writes local time with a misleading `Z` suffix.
    #[serde(default)]
    start_date_local: Option<DateTime<Utc>>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    moving_time: i64,
    #[serde(default)]
    elapsed_time: i64,
    #[serde(default)]
    total_elevation_gain: f64,
    #[serde(default)]
    average_speed: Option<f64>,
    #[serde(default)]
    max_speed: Option<f64>,
    #[serde(default)]
    average_heartrate: Option<f64>,
    #[serde(default)]
    max_heartrate: Option<f64>,
    #[serde(default)]
    calories: Option<f64>,
    #[serde(default)]
    start_latlng: Option<Vec<f64>>,
    #[serde(default)]
    end_latlng: Option<Vec<f64>>,
    #[serde(default)]
    map: Option<StravaMap>,
}

#[derive(Debug, Deserialize)]
struct StravaMap {
    #[serde(default)]
    summary_polyline: Option<String>,
}

fn latlng(v: Option<Vec<f64>>) -> Option<[f64; 2]> {
    match v.as_deref() {
        Some([lat, lng]) => Some([*lat, *lng]),
        _ => None,
    }
}

/// Maps one item of `GET /athlete/activities` into an [`Activity`].
pub fn activity_from_strava(
    user_id: Uuid,
    raw: serde_json::Value,
) -> Result<Activity, IntegrationError> {
    let parsed: StravaActivity = serde_json::from_value(raw.clone())
        .map_err(|e| IntegrationError::Decode(format!("Strava activity: {e}")))?;

    let sport_type = parsed
        .sport_type
        .or(parsed.activity_type)
        .unwrap_or_else(|| "Workout".to_string());
    let name = parsed
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("{sport_type} {}", parsed.start_date.format("%Y-%m-%d")));

    let mut activity = Activity::new(user_id, parsed.id, name, sport_type, parsed.start_date)
        .with_effort(parsed.distance, parsed.moving_time, parsed.elapsed_time)
        .with_elevation(parsed.total_elevation_gain);

    activity.start_date_local = parsed.start_date_local.map(|d| d.naive_utc());
    activity.timezone = parsed.timezone;
    if parsed.average_speed.is_some() {
        activity.average_speed_mps = parsed.average_speed;
    }
    activity.max_speed_mps = parsed.max_speed;
    activity.average_heartrate = parsed.average_heartrate;
    activity.max_heartrate = parsed.max_heartrate;
    activity.calories = parsed.calories;
    activity.start_latlng = latlng(parsed.start_latlng);
    activity.end_latlng = latlng(parsed.end_latlng);
    activity.summary_polyline = parsed
        .map
        .and_then(|m| m.summary_polyline)
        .filter(|p| !p.is_empty());
    activity.raw = raw;
    Ok(activity)
}
