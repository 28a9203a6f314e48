//! Runtime choice between the evaluator adapters.

use crate::config::{AnalysisConfig, EvaluatorKind};
use crate::error::EvaluatorFailure;
use crate::evaluator::{Depth, EvaluationResult, Evaluator, EvaluatorFactory};
use crate::script::{ScriptEvaluator, ScriptFactory};
use crate::stockfish::{UciFactory, UciSession};

#[derive(Debug, Clone)]
pub enum EngineBackend {
    Uci(UciFactory),
    Script(ScriptFactory),
}

impl EngineBackend {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        match config.evaluator {
            EvaluatorKind::Uci => EngineBackend::Uci(UciFactory::new(
                config.stockfish_path.clone(),
                config.engine_options(),
            )),
            EvaluatorKind::Script => EngineBackend::Script(ScriptFactory::new(
                config.evaluator_program.clone(),
                config.evaluator_script.clone(),
            )),
        }
    }
}

pub enum BackendSession {
    Uci(UciSession),
    Script(ScriptEvaluator),
}

impl EvaluatorFactory for EngineBackend {
    type Evaluator = BackendSession;

    async fn open(&self) -> Result<BackendSession, EvaluatorFailure> {
        match self {
            EngineBackend::Uci(factory) => factory.open().await.map(BackendSession::Uci),
            EngineBackend::Script(factory) => factory.open().await.map(BackendSession::Script),
        }
    }

    fn name(&self) -> &str {
        match self {
            EngineBackend::Uci(factory) => factory.name(),
            EngineBackend::Script(factory) => factory.name(),
        }
    }
}

impl Evaluator for BackendSession {
    async fn evaluate(&mut self, fen: &str, depth: Depth) -> Result<EvaluationResult, EvaluatorFailure> {
        match self {
            BackendSession::Uci(session) => session.evaluate(fen, depth).await,
            BackendSession::Script(session) => session.evaluate(fen, depth).await,
        }
    }

    async fn close(self) {
        match self {
            BackendSession::Uci(session) => session.close().await,
            BackendSession::Script(session) => session.close().await,
        }
    }
}
