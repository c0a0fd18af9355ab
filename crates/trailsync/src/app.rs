use axum::{
    http::{header, Method, StatusCode},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use trailsync_auth::auth_routes;

use crate::{
    handlers::{
        activities, admin, chat, connections, debug, health, import, map, pages,
    },
    state::AppState,
};

/// Create the application router with all routes and middleware.
pub fn create_app(state: AppState) -> Router {
    // CORS configuration for API endpoints
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let api_routes = Router::new()
        // Activities
        .route("/activities", get(activities::list_activities))
        .route("/activities/bulk-delete", post(activities::bulk_delete))
        .route(
            "/activities/{id}",
            get(activities::get_activity).delete(activities::delete_activity),
        )
        .route("/activities/{id}/route", get(activities::route))
        .route("/activities/{id}/photos", get(activities::photos))
        .route("/activities/{id}/analysis", post(activities::analysis))
        .route("/map", get(map::map_data))
        .route("/stats", get(activities::stats))
        .route("/import/logs", get(import::import_logs))
        .route("/chat", post(chat::chat))
        // Connections
        .route("/connections", get(connections::list_connections))
        .route("/connections/{provider}", delete(connections::disconnect))
        // Admin
        .route("/admin/stats", get(admin::stats))
        .route("/admin/users", get(admin::list_users).post(admin::create_user))
        .route("/admin/users/{id}", delete(admin::delete_user))
        .route("/admin/users/{id}/unlock", post(admin::unlock_user))
        .route("/admin/settings", get(admin::list_settings))
        .route(
            "/admin/settings/{key}",
            put(admin::put_setting).delete(admin::delete_setting),
        )
        .route("/debug/config", get(debug::config));

    // Imports page through Strava and get their own, longer deadline
    let import_routes = Router::new()
        .route("/api/import", post(import::start_import))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.import_request_timeout(),
        ));

    Router::new()
        .route("/", get(pages::dashboard))
        .route("/login", get(pages::login))
        .route("/activities", get(pages::activities))
        .route("/map", get(pages::map))
        .route("/chat", get(pages::chat))
        .route("/admin", get(pages::admin))
        .route("/connect/strava", get(connections::connect_strava))
        .route(
            connections::STRAVA_CALLBACK_PATH,
            get(connections::strava_callback),
        )
        .route("/connect/google-photos", get(connections::connect_google))
        .route(
            connections::GOOGLE_CALLBACK_PATH,
            get(connections::google_callback),
        )
        .route("/livez", get(health::livez))
        .route("/healthz", get(health::healthz))
        .nest("/api", api_routes)
        .merge(auth_routes().with_state(state.auth.clone()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.request_timeout(),
        ))
        .merge(import_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
