mod app;
mod config;
mod handlers;
mod integrations;
mod mock_data;
mod services;
mod state;
mod storage;

use anyhow::Result;
use clap::Parser;
use listenfd::ListenFd;
use tokio::{net::TcpListener, signal};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trailsync_auth::{ensure_admin_user, AuthConfig};

use crate::{app::create_app, config::Config, state::AppState};

/// Trailsync - Import, browse and chat about your Strava activities
#[derive(Parser, Debug)]
#[command(name = "trailsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Host address to bind the server to
    #[arg(long, short = 'H', default_value = "0.0.0.0", env = "HOST")]
    host: String,

    /// Port to listen on
    #[arg(long, short, default_value = "3000", env = "PORT")]
    port: u16,

    /// Seed a demo user with generated activities
    #[arg(long, env = "DEMO")]
    demo: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::from_env();
    let auth_config = AuthConfig::from_env()?;
    let state = build_state(config, auth_config).await?;

    bootstrap_admin(&state).await?;
    if cli.demo {
        let demo = mock_data::seed_demo_data(&state).await?;
        tracing::info!(username = %demo.username, "demo data ready");
    }

    // Build the application router
    let app = create_app(state.clone());

    // Auto-reload support via listenfd
    let mut listenfd = ListenFd::from_env();
    let listener = match listenfd.take_tcp_listener(0)? {
        // If we are given a tcp listener on listen fd 0, use that one
        Some(listener) => {
            listener.set_nonblocking(true)?;
            TcpListener::from_std(listener)?
        }
        // Otherwise fall back to CLI-specified host:port
        None => {
            let addr = format!("{}:{}", cli.host, cli.port);
            TcpListener::bind(&addr).await?
        }
    };

    tracing::info!("listening on {}", listener.local_addr()?);

    // Run the server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// `RUST_LOG` filters; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "trailsync=debug,trailsync_auth=debug,tower_http=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(feature = "postgres")]
async fn build_state(config: Config, auth_config: AuthConfig) -> Result<AppState> {
    match config.database_url.clone() {
        Some(url) => AppState::postgres(&url, config, auth_config).await,
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory storage");
            Ok(AppState::in_memory(config, auth_config))
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn build_state(config: Config, auth_config: AuthConfig) -> Result<AppState> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL is set but the postgres feature is not built in, using in-memory storage");
    } else {
        tracing::info!("using in-memory storage");
    }
    Ok(AppState::in_memory(config, auth_config))
}

/// Creates the administrator from `ADMIN_USERNAME` / `ADMIN_PASSWORD` on
/// first start.
async fn bootstrap_admin(state: &AppState) -> Result<()> {
    let (Ok(username), Ok(password)) = (
        std::env::var("ADMIN_USERNAME"),
        std::env::var("ADMIN_PASSWORD"),
    ) else {
        tracing::debug!("ADMIN_USERNAME/ADMIN_PASSWORD not set, skipping admin bootstrap");
        return Ok(());
    };

    if let Some(admin) = ensure_admin_user(
        state.users.as_ref(),
        &username,
        &password,
        state.auth.config.bcrypt_cost,
    )
    .await?
    {
        tracing::info!(username = %admin.username, "created admin user");
    }
    Ok(())
}

/// Wait for shutdown signals (Ctrl+C or SIGTERM) and stop running imports.
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }

    state.signal_shutdown();
}
