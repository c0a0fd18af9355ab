//! Server-rendered pages.
//!
//! Pages are askama templates. Anonymous visitors are redirected to
//! `/login`; the pages then load their data from the JSON API.

use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use trailsync_auth::OptionalUser;
use trailsync_core::activity::{format_distance_km, format_duration, ActivityStats};
use trailsync_core::auth::{validate_return_to, User};
use trailsync_core::connection::{ConnectionStatus, OAuthProvider};
use trailsync_core::storage::ActivityFilter;

use super::activities::{load_activity_page, load_activity_stats};
use super::{ApiError, AppError};
use crate::state::AppState;

/// Template wrapper that converts Askama templates into HTML responses.
struct HtmlTemplate<T>(T);

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: Template,
{
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template: {err}"),
            )
                .into_response(),
        }
    }
}

fn login_redirect(path: &str) -> Response {
    Redirect::to(&format!("/login?return_to={}", urlencoding::encode(path))).into_response()
}

/// Fields every page's navigation bar needs.
struct Nav {
    username: String,
    is_admin: bool,
}

impl From<&User> for Nav {
    fn from(user: &User) -> Self {
        Self {
            username: user.display_name.clone(),
            is_admin: user.is_admin(),
        }
    }
}

// ============================================================================
// Login
// ============================================================================

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    return_to: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub return_to: Option<String>,
}

/// GET /login
pub async fn login(OptionalUser(user): OptionalUser, Query(query): Query<LoginQuery>) -> Response {
    let return_to = query
        .return_to
        .as_deref()
        .and_then(validate_return_to)
        .unwrap_or("/")
        .to_string();

    if user.is_some() {
        return Redirect::to(&return_to).into_response();
    }
    HtmlTemplate(LoginTemplate { return_to }).into_response()
}

// ============================================================================
// Dashboard
// ============================================================================

struct SportRow {
    sport: String,
    count: u64,
    distance: String,
    time: String,
}

struct ConnectionRow {
    label: &'static str,
    provider: &'static str,
    connect_url: &'static str,
    connected: bool,
    account: String,
}

struct RecentRow {
    id: String,
    name: String,
    sport: String,
    date: String,
    distance: String,
    time: String,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    nav: Nav,
    mock: bool,
    total_count: u64,
    total_distance: String,
    total_time: String,
    sports: Vec<SportRow>,
    connections: Vec<ConnectionRow>,
    recent: Vec<RecentRow>,
}

const RECENT_ON_DASHBOARD: u32 = 5;

fn sport_rows(stats: &ActivityStats) -> Vec<SportRow> {
    stats
        .by_sport
        .iter()
        .map(|(sport, s)| SportRow {
            sport: sport.clone(),
            count: s.count,
            distance: format_distance_km(s.distance_m),
            time: format_duration(s.moving_time_s),
        })
        .collect()
}

fn connection_row(status: &ConnectionStatus) -> ConnectionRow {
    let connect_url = match status.provider {
        OAuthProvider::Strava => "/connect/strava",
        OAuthProvider::GooglePhotos => "/connect/google-photos",
    };
    ConnectionRow {
        label: status.provider.label(),
        provider: status.provider.as_str(),
        connect_url,
        connected: status.connected,
        account: status.account_name.clone().unwrap_or_default(),
    }
}

/// GET /
pub async fn dashboard(
    OptionalUser(user): OptionalUser,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let Some(user) = user else {
        return Ok(login_redirect("/"));
    };

    let (stats, stats_mock) = load_activity_stats(&state, user.id).await?;
    let filter = ActivityFilter {
        limit: RECENT_ON_DASHBOARD,
        ..ActivityFilter::default()
    };
    let (recent, recent_mock) = load_activity_page(&state, user.id, &filter).await?;

    let stored = match state.connections.list_connections(user.id).await {
        Ok(stored) => stored,
        Err(e) if state.config.mock_fallback => {
            tracing::warn!(user_id = %user.id, error = %e, "connection read failed");
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };
    let connections = [OAuthProvider::Strava, OAuthProvider::GooglePhotos]
        .into_iter()
        .map(|provider| {
            let status = stored
                .iter()
                .find(|c| c.provider == provider)
                .map(ConnectionStatus::from)
                .unwrap_or_else(|| ConnectionStatus::disconnected(provider));
            connection_row(&status)
        })
        .collect();

    let recent = recent
        .items
        .iter()
        .map(|a| RecentRow {
            id: a.id.to_string(),
            name: a.name.clone(),
            sport: a.sport_type.clone(),
            date: a.start_date.format("%Y-%m-%d").to_string(),
            distance: format_distance_km(a.distance_m),
            time: format_duration(a.moving_time_s),
        })
        .collect();

    Ok(HtmlTemplate(DashboardTemplate {
        nav: Nav::from(&user),
        mock: stats_mock || recent_mock,
        total_count: stats.count,
        total_distance: format_distance_km(stats.total_distance_m),
        total_time: format_duration(stats.total_moving_time_s),
        sports: sport_rows(&stats),
        connections,
        recent,
    })
    .into_response())
}

// ============================================================================
// Activities, map, chat and admin shells
// ============================================================================

#[derive(Template)]
#[template(path = "activities.html")]
struct ActivitiesTemplate {
    nav: Nav,
}

#[derive(Template)]
#[template(path = "map.html")]
struct MapTemplate {
    nav: Nav,
}

#[derive(Template)]
#[template(path = "chat.html")]
struct ChatTemplate {
    nav: Nav,
}

#[derive(Template)]
#[template(path = "admin.html")]
struct AdminTemplate {
    nav: Nav,
}

/// GET /activities
pub async fn activities(OptionalUser(user): OptionalUser) -> Response {
    match user {
        Some(user) => HtmlTemplate(ActivitiesTemplate {
            nav: Nav::from(&user),
        })
        .into_response(),
        None => login_redirect("/activities"),
    }
}

/// GET /map
pub async fn map(OptionalUser(user): OptionalUser) -> Response {
    match user {
        Some(user) => HtmlTemplate(MapTemplate {
            nav: Nav::from(&user),
        })
        .into_response(),
        None => login_redirect("/map"),
    }
}

/// GET /chat
pub async fn chat(OptionalUser(user): OptionalUser) -> Response {
    match user {
        Some(user) => HtmlTemplate(ChatTemplate {
            nav: Nav::from(&user),
        })
        .into_response(),
        None => login_redirect("/chat"),
    }
}

/// GET /admin - administrators only.
pub async fn admin(OptionalUser(user): OptionalUser) -> Result<Response, AppError> {
    let Some(user) = user else {
        return Ok(login_redirect("/admin"));
    };
    if !user.is_admin() {
        return Err(ApiError::Forbidden.into());
    }
    Ok(HtmlTemplate(AdminTemplate {
        nav: Nav::from(&user),
    })
    .into_response())
}
