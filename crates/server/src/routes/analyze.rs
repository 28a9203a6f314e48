use std::sync::Arc;

use analysis_worker::{Depth, EvaluationResult, EvaluatorFactory, Orchestrator, Score};
use axum::{extract::rejection::JsonRejection, extract::Query, Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{depth_or, json_body};
use crate::error::AppError;

/// Depth for the GET route when the query omits it.
const DEFAULT_DEPTH: u8 = 15;

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub fen: Option<String>,
    pub depth: Option<i64>,
}

#[derive(Deserialize)]
pub struct AnalyzeQuery {
    pub fen: Option<String>,
    pub depth: Option<String>,
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub fen: String,
    pub best_move: Option<String>,
    pub best_move_san: Option<String>,
    pub evaluation: Score,
    pub is_mate: bool,
    pub mate_distance: Option<i32>,
    pub depth: u32,
}

impl From<EvaluationResult> for AnalyzeResponse {
    fn from(result: EvaluationResult) -> Self {
        Self {
            success: true,
            fen: result.fen,
            best_move: result.best_move,
            best_move_san: result.best_move_san,
            evaluation: result.score,
            is_mate: result.is_mate,
            mate_distance: result.mate_distance,
            depth: result.depth,
        }
    }
}

/// Frontend shape of a single-position analysis
#[derive(Serialize)]
pub struct EngineMoveResponse {
    pub bestmove: Option<String>,
    pub evaluation: Score,
    pub depth: u32,
    pub multithreaded: bool,
    pub success: bool,
}

fn required_fen(fen: Option<String>) -> Result<String, AppError> {
    fen.map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .ok_or_else(|| AppError::BadRequest("FEN string is required".into()))
}

/// POST /analyze
pub async fn analyze_position<F: EvaluatorFactory>(
    Extension(orchestrator): Extension<Arc<Orchestrator<F>>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let body = json_body(payload)?;
    let fen = required_fen(body.fen)?;
    let depth = body
        .depth
        .ok_or_else(|| AppError::BadRequest("Depth is required".into()))
        .and_then(|d| Ok(Depth::new(d)?))?;

    info!(%fen, %depth, "Analyzing position");
    let result = orchestrator.evaluate_position(&fen, depth).await?;
    Ok(Json(result.into()))
}

/// GET /api/stockfish/analyze?fen=&depth=
pub async fn stockfish_analyze<F: EvaluatorFactory>(
    Extension(orchestrator): Extension<Arc<Orchestrator<F>>>,
    Query(q): Query<AnalyzeQuery>,
) -> Result<Json<EngineMoveResponse>, AppError> {
    let fen = required_fen(q.fen)?;
    let depth = match q.depth.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| AppError::BadRequest(format!("Invalid depth '{raw}'")))?,
        ),
        None => None,
    };
    let depth = depth_or(depth, DEFAULT_DEPTH)?;

    let result = orchestrator.evaluate_position(&fen, depth).await?;
    Ok(Json(EngineMoveResponse {
        bestmove: result.best_move,
        evaluation: result.score,
        depth: result.depth,
        multithreaded: orchestrator.config().max_workers > 1,
        success: true,
    }))
}
