/// nodekb: n8n workflow node knowledge base
///
/// Main entry point for the nodekb server. Loads configuration from the environment
/// and starts the HTTP server.

use nodekb::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Workflow template API at /api/workflows/*
/// - Node record lookups at /api/nodes/*
/// - Health check at /healthz
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
