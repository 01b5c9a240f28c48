//! Backend server binary for the T-Care assistant.

use std::path::PathBuf;
use std::sync::Arc;
use tcare::agent::AutonomousAgent;
use tcare::config::AssistConfig;
use tcare::decision::DecisionEngine;
use tcare::sentiment::SentimentService;
use tcare::server::{router, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing — suppress noisy dependency logs by default.
    // Users can override with RUST_LOG=debug to see everything.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tcare=info,tower=warn,hyper=warn")),
        )
        .init();

    // Config file path from TCARE_CONFIG, falling back to ./tcare.toml.
    // A missing file just means defaults plus environment overrides.
    let config_path = std::env::var("TCARE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("tcare.toml"));
    let config = AssistConfig::load(&config_path)?;

    println!("T-Care backend v{}", env!("CARGO_PKG_VERSION"));

    let sentiment = Arc::new(SentimentService::new(config.sentiment.clone()));
    let state = AppState {
        sentiment: Arc::clone(&sentiment),
        decision: Arc::new(DecisionEngine::new(&config.decision)),
        agent: Arc::new(AutonomousAgent::new(&config.decision)),
    };

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("received Ctrl+C, shutting down...");
        })
        .await?;

    // The analyzer child outlives the HTTP server unless stopped here.
    sentiment.stop();

    Ok(())
}
