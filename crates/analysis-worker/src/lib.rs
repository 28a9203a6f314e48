//! Multi-worker engine analysis of whole games.

pub mod analysis;
pub mod backend;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod orchestrator;
pub mod pool;
pub mod report;
pub mod score;
pub mod script;
pub mod stockfish;
#[cfg(any(test, feature = "test-util"))]
pub mod stub;

pub use analysis::{Classifications, MoveClass};
pub use backend::EngineBackend;
pub use config::{AnalysisConfig, EvaluatorKind};
pub use error::{AnalysisError, EvaluatorFailure};
pub use evaluator::{Depth, EvaluationJob, EvaluationResult, Evaluator, EvaluatorFactory};
pub use orchestrator::{BatchState, GameRequest, Orchestrator, OrchestratorConfig};
pub use pool::{JobOutcome, JobStream, WorkerPool};
pub use report::{AnalysisRun, GameAnalysis, GameSummary, MoveRecord, PositionRecord, PositionStatus, RunReport};
pub use score::{RawScore, Score};
