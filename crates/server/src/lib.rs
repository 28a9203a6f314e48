pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use analysis_worker::{EvaluatorFactory, Orchestrator};
use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Build the HTTP router around an orchestrator.
pub fn app<F: EvaluatorFactory>(orchestrator: Arc<Orchestrator<F>>) -> Router {
    // CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::health::index))
        .route("/health", get(routes::health::health_check::<F>))
        .route("/test", get(routes::health::test_engine::<F>))
        // Single positions
        .route("/analyze", post(routes::analyze::analyze_position::<F>))
        .route("/api/stockfish/analyze", get(routes::analyze::stockfish_analyze::<F>))
        // Whole games
        .route("/analyze-pgn", post(routes::games::analyze_pgn::<F>))
        .route("/evaluate-game", post(routes::games::evaluate_game::<F>))
        .layer(Extension(orchestrator))
        .layer(cors)
}
