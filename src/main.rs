use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pubquiz::{
    api::{self, AppState},
    catalog,
    config::{Cli, Config},
    state::GameState,
    sweeper,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pubquiz=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let addr = match config.addr() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let game = match catalog::load_catalog(&config.questions_path).and_then(GameState::new) {
        Ok(game) => game,
        Err(e) => {
            tracing::error!(
                path = %config.questions_path.display(),
                error = %e,
                "Failed to load question catalog"
            );
            std::process::exit(1);
        }
    };

    tracing::info!(
        questions = game.total_questions().await,
        testing_mode = config.testing_mode,
        "Starting pub quiz..."
    );

    let sweep_interval = Duration::from_secs(config.sweep_interval_secs);
    let state = AppState::new(game, config);
    sweeper::spawn_session_sweeper(state.sessions.clone(), sweep_interval);

    let app = api::router(state);

    tracing::info!("Listening on http://{}", addr);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutting down");
    };

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
