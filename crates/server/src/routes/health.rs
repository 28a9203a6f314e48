use std::sync::Arc;

use analysis_worker::{Depth, EvaluatorFactory, Orchestrator};
use axum::{http::StatusCode, Extension, Json};
use chess_core::STANDARD_START_FEN;
use serde_json::{json, Value as JsonValue};

const TEST_DEPTH: i64 = 10;

/// GET /
pub async fn index() -> Json<JsonValue> {
    Json(json!({
        "message": "Chess analysis backend",
        "status": "running",
        "endpoints": {
            "POST /analyze": "Analyze chess position",
            "GET /api/stockfish/analyze": "Frontend AI endpoint",
            "POST /analyze-pgn": "Multi-worker PGN analysis",
            "POST /evaluate-game": "Evaluate a SAN move list",
            "GET /test": "Test evaluator integration",
            "GET /health": "Health check"
        }
    }))
}

/// GET /health
pub async fn health_check<F: EvaluatorFactory>(
    Extension(orchestrator): Extension<Arc<Orchestrator<F>>>,
) -> Json<JsonValue> {
    let workers = orchestrator.config().max_workers;
    Json(json!({
        "status": "healthy",
        "service": "Chess Analysis Backend",
        "evaluator": orchestrator.factory().name(),
        "multithreaded": workers > 1,
        "max_workers": workers,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /test: evaluate the start position end to end
pub async fn test_engine<F: EvaluatorFactory>(
    Extension(orchestrator): Extension<Arc<Orchestrator<F>>>,
) -> (StatusCode, Json<JsonValue>) {
    let outcome = match Depth::new(TEST_DEPTH) {
        Ok(depth) => orchestrator
            .evaluate_position(STANDARD_START_FEN, depth)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match outcome {
        Ok(result) if result.best_move.is_some() => (
            StatusCode::OK,
            Json(json!({
                "message": "Evaluator integration working correctly",
                "status": "success",
                "best_move": result.best_move,
            })),
        ),
        Ok(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "message": "Evaluator returned no move for the start position",
                "status": "error",
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Evaluator integration test failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "message": format!("Integration test error: {e}"),
                    "status": "error",
                })),
            )
        }
    }
}
