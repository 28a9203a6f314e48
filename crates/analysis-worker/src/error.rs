//! Analysis error types

use std::time::Duration;

use chess_core::ChessError;
use thiserror::Error;

/// Why a single position could not be evaluated.
///
/// Always scoped to one job; the pool reports it in-band and the
/// orchestrator decides whether it is fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluatorFailure {
    #[error("Failed to start evaluator: {0}")]
    Spawn(String),

    #[error("Evaluator exited with status {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },

    #[error("Unparsable evaluator output: {0}")]
    Parse(String),

    #[error("Evaluator reported failure: {0}")]
    Engine(String),

    #[error("Evaluation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Evaluator I/O error: {0}")]
    Io(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("Illegal move at ply {ply}: {san}")]
    IllegalMove { ply: usize, san: String },

    #[error("Evaluation failed for {fen}: {source}")]
    Evaluator {
        fen: String,
        #[source]
        source: EvaluatorFailure,
    },

    #[error("No evaluator workers could be started: {0}")]
    SchedulerExhaustion(String),
}

impl From<ChessError> for AnalysisError {
    fn from(err: ChessError) -> Self {
        match err {
            ChessError::IllegalMove { ply, san } => AnalysisError::IllegalMove { ply, san },
            other => AnalysisError::Validation(other.to_string()),
        }
    }
}
