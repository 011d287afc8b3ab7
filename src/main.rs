mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod storage;
#[cfg(test)]
mod test_support;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::services::{LifecycleManager, Mailer, Reaper, SystemClock};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub lifecycle: Arc<LifecycleManager>,
    pub mailer: Arc<dyn Mailer>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dropshare=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting dropshare...");

    // Load configuration
    let config = Arc::new(Config::load()?);
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.database.path).await?;
    db.run_migrations().await?;
    tracing::info!("Database initialized");

    // Collaborators are built once here and shared read-only
    let storage = storage::provider_from_config(&config.storage)?;
    let mailer = services::mailer_from_config(&config.mail)?;
    let lifecycle = Arc::new(
        LifecycleManager::new(
            db.clone(),
            storage,
            Arc::new(SystemClock),
            config.retention_window(),
        )
        .with_storage_timeout(Duration::from_secs(config.storage.timeout_secs)),
    );

    let reaper = Reaper::spawn(
        lifecycle.clone(),
        Duration::from_secs(config.retention.reaper_interval_secs),
    );

    let state = AppState {
        db,
        config: config.clone(),
        lifecycle,
        mailer,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    reaper.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_limit = state.config.server.max_upload_mb.saturating_mul(1024 * 1024);

    let file_routes = Router::new()
        .route(
            "/upload",
            post(handlers::file::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/info/:id", get(handlers::file::get_file_info))
        .route("/download/:id", get(handlers::file::download_file))
        .route("/download/:id/raw", get(handlers::file::download_file_raw))
        .route("/my-files", get(handlers::file::list_my_files))
        .route("/send-email", post(handlers::notify::send_email))
        .route("/:id", delete(handlers::file::delete_file))
        .route("/:id/downloads", get(handlers::file::list_downloads));

    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/api/file", file_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
