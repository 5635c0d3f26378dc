/// Server setup and initialization
///
/// Wires together the document store, the sync saga and the HTTP routes.

use crate::{
    api::{create_node_routes, create_workflow_routes, AppState},
    config::Config,
    store::{DocumentStore, SqliteDocumentStore},
    sync::WorkflowSync,
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::{path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Build the router over an already opened document store
pub fn build_router(store: Arc<dyn DocumentStore>) -> Router {
    let app_state = AppState {
        sync: WorkflowSync::new(store),
    };

    Router::new()
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes())
        .merge(create_node_routes())
        .with_state(app_state)
}

/// Create the main Axum application with all routes
///
/// Opens (and if needed creates) the SQLite document database before building routes.
pub async fn create_app(config: Config) -> Result<Router> {
    if let Some(db_path) = config.database.file_path() {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tracing::info!("📁 Ensuring data directory exists: {}", parent.display());
                std::fs::create_dir_all(parent)
                    .map_err(|e| anyhow::anyhow!("Failed to create data directory: {}", e))?;
            }
        }
    }

    tracing::info!("🗄️ Opening document database: {}", config.database.url);
    let store = SqliteDocumentStore::connect(&config.database.url, config.database.max_connections)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open document database: {}", e))?;

    let app = build_router(Arc::new(store));
    tracing::info!("✅ Application initialized successfully");

    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting nodekb server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
