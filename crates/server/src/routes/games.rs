use std::collections::BTreeMap;
use std::sync::Arc;

use analysis_worker::{
    EvaluatorFactory, GameAnalysis, GameRequest, Orchestrator, PositionRecord, RunReport, Score,
};
use axum::{extract::rejection::JsonRejection, Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

use super::{depth_or, json_body};
use crate::error::AppError;

const DEFAULT_DEPTH: u8 = 10;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzePgnRequest {
    pub pgn: Option<String>,
    pub depth: Option<i64>,
    pub use_multi_worker: Option<bool>,
    pub max_workers: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateGameRequest {
    pub moves: Option<Vec<String>>,
    pub depth: Option<i64>,
    pub use_multi_worker: Option<bool>,
    pub max_workers: Option<usize>,
}

/// Entry of the positional map returned by the sequential game evaluation
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyEvaluation {
    /// Centipawns, or signed moves to mate
    pub evaluation: i32,
    pub mate: Option<i32>,
    pub depth: u32,
    pub best_line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&PositionRecord> for LegacyEvaluation {
    fn from(record: &PositionRecord) -> Self {
        let evaluation = match record.evaluation {
            Some(Score::Centipawns(cp)) => cp,
            Some(score) => score.mate_distance().unwrap_or_default(),
            None => 0,
        };
        Self {
            evaluation,
            mate: record.mate_distance,
            depth: record.depth.unwrap_or(0),
            best_line: record.best_move.clone().unwrap_or_default(),
            error: record.error.clone(),
        }
    }
}

/// Worker override for a request: one worker when multi-worker is off.
fn worker_override(use_multi_worker: Option<bool>, max_workers: Option<usize>) -> Option<usize> {
    if use_multi_worker == Some(false) {
        Some(1)
    } else {
        max_workers.filter(|n| *n > 0)
    }
}

/// `"start"` for the initial position, then `"i"` for the position after move `i`.
pub fn legacy_evaluations(analysis: &GameAnalysis) -> BTreeMap<String, LegacyEvaluation> {
    let mut out = BTreeMap::new();
    let Some(first) = analysis.moves.first() else {
        return out;
    };
    if let Some(start) = analysis.positions.get(&first.fen_before) {
        out.insert("start".to_string(), start.into());
    }
    for (i, mv) in analysis.moves.iter().enumerate() {
        if let Some(record) = analysis.positions.get(&mv.fen_after) {
            out.insert(i.to_string(), record.into());
        }
    }
    out
}

/// POST /analyze-pgn
pub async fn analyze_pgn<F: EvaluatorFactory>(
    Extension(orchestrator): Extension<Arc<Orchestrator<F>>>,
    payload: Result<Json<AnalyzePgnRequest>, JsonRejection>,
) -> Result<Json<RunReport>, AppError> {
    let body = json_body(payload)?;
    let pgn = body
        .pgn
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("PGN string is required and must not be empty".into()))?;
    let depth = depth_or(body.depth, DEFAULT_DEPTH)?;
    let workers = worker_override(body.use_multi_worker, body.max_workers);

    info!(%depth, pgn_len = pgn.len(), workers = ?workers, "PGN analysis request");
    let run = orchestrator.analyze_pgn(&pgn, depth, workers).await?;
    info!(
        positions = run.total_positions,
        elapsed_ms = run.elapsed.as_millis() as u64,
        "PGN analysis complete"
    );
    Ok(Json(run.report()))
}

/// POST /evaluate-game
pub async fn evaluate_game<F: EvaluatorFactory>(
    Extension(orchestrator): Extension<Arc<Orchestrator<F>>>,
    payload: Result<Json<EvaluateGameRequest>, JsonRejection>,
) -> Result<Json<JsonValue>, AppError> {
    let body = json_body(payload)?;
    let moves = body
        .moves
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::BadRequest("Moves array is required and must not be empty".into()))?;
    let depth = depth_or(body.depth, DEFAULT_DEPTH)?;
    let sequential = body.use_multi_worker == Some(false);
    let workers = worker_override(body.use_multi_worker, body.max_workers);

    info!(moves = moves.len(), %depth, sequential, "Game evaluation request");
    let request = GameRequest::new(moves, depth).with_max_workers(workers);
    let run = orchestrator.analyze_game(request).await?;

    let value = if sequential {
        serde_json::to_value(legacy_evaluations(&run.analysis))
    } else {
        serde_json::to_value(&run.analysis.positions)
    }
    .map_err(|e| AppError::Internal(format!("Failed to serialize analysis: {e}")))?;
    Ok(Json(value))
}
