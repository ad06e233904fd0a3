use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod agents;
mod apis;
mod config;
mod mcp;
mod pipeline;
mod server;

use config::Config;
use mcp::PaperDigestServer;
use server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let command = std::env::args().nth(1).unwrap_or_else(|| "serve".to_string());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if command == "mcp" {
        // stdout carries the protocol
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = Config::from_env();
    let pipeline = config.build_pipeline().map(Arc::new);
    match &pipeline {
        Ok(_) => tracing::info!(
            "Initialized {} paper sources, model={}",
            config.enabled_sources.len(),
            config.model
        ),
        Err(e) => tracing::error!("Research pipeline unavailable: {}", e),
    }

    match command.as_str() {
        "serve" => server::serve(config.bind_addr, AppState::new(pipeline)).await,
        "mcp" => {
            tracing::info!("Starting paper-digest MCP server");
            mcp::serve_stdio(PaperDigestServer::new(Arc::new(config), pipeline)).await
        }
        other => anyhow::bail!("unknown command '{}': expected 'serve' or 'mcp'", other),
    }
}
