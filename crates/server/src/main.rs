use std::sync::Arc;

use analysis_worker::{AnalysisConfig, EngineBackend, Orchestrator};
use anyhow::Context;
use tracing_subscriber::EnvFilter;

use server::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();
    let analysis = AnalysisConfig::from_env()?;
    tracing::info!(
        evaluator = ?analysis.evaluator,
        stockfish_path = %analysis.stockfish_path,
        max_workers = analysis.max_workers,
        job_timeout_secs = analysis.job_timeout_secs,
        "Analysis config loaded"
    );

    let orchestrator = Arc::new(Orchestrator::new(
        EngineBackend::from_config(&analysis),
        analysis.orchestrator(),
    ));
    let app = server::app(orchestrator);

    let addr = config.addr();
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
