//! Analysis configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AnalysisError;
use crate::orchestrator::OrchestratorConfig;
use crate::pool::default_workers;
use crate::stockfish::EngineOptions;

/// Which evaluator adapter backs the workers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvaluatorKind {
    /// Persistent Stockfish process per worker
    Uci,
    /// One script process per position
    Script,
}

#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    pub evaluator: EvaluatorKind,

    /// Path to Stockfish binary
    pub stockfish_path: String,

    /// Interpreter for the script evaluator
    pub evaluator_program: String,

    /// Script passed to `evaluator_program`
    pub evaluator_script: Option<PathBuf>,

    /// Worker count when a request does not set one
    pub max_workers: usize,

    pub engine_threads: u32,
    pub engine_hash_mb: u32,

    /// Per-position limit; 0 disables it
    pub job_timeout_secs: u64,

    /// Whole-batch limit
    pub batch_deadline_secs: Option<u64>,

    pub abort_on_first_failure: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            evaluator: EvaluatorKind::Uci,
            stockfish_path: "/usr/local/bin/stockfish".to_string(),
            evaluator_program: "python3".to_string(),
            evaluator_script: None,
            max_workers: default_workers(),
            engine_threads: 1,
            engine_hash_mb: 128,
            job_timeout_secs: 30,
            batch_deadline_secs: None,
            abort_on_first_failure: false,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AnalysisError> {
        let defaults = Self::default();

        let evaluator = match env::var("EVALUATOR").ok().as_deref().map(str::trim) {
            None | Some("") | Some("uci") | Some("stockfish") => EvaluatorKind::Uci,
            Some("script") => EvaluatorKind::Script,
            Some(other) => {
                return Err(AnalysisError::Config(format!(
                    "EVALUATOR must be 'uci' or 'script', got '{other}'"
                )))
            }
        };

        let stockfish_path = env::var("STOCKFISH_PATH").unwrap_or(defaults.stockfish_path);

        let evaluator_program =
            env::var("EVALUATOR_PROGRAM").unwrap_or(defaults.evaluator_program);

        let evaluator_script = env::var("EVALUATOR_SCRIPT")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        if evaluator == EvaluatorKind::Script && evaluator_script.is_none() {
            return Err(AnalysisError::Config(
                "EVALUATOR_SCRIPT must be set when EVALUATOR=script".to_string(),
            ));
        }

        let max_workers = env::var("MAX_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_workers);

        let engine_threads = env::var("ENGINE_THREADS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.engine_threads);

        let engine_hash_mb = env::var("ENGINE_HASH_MB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.engine_hash_mb);

        let job_timeout_secs = env::var("JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.job_timeout_secs);

        let batch_deadline_secs = env::var("BATCH_DEADLINE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0);

        let abort_on_first_failure = env::var("ABORT_ON_FIRST_FAILURE")
            .ok()
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.abort_on_first_failure);

        Ok(Self {
            evaluator,
            stockfish_path,
            evaluator_program,
            evaluator_script,
            max_workers,
            engine_threads,
            engine_hash_mb,
            job_timeout_secs,
            batch_deadline_secs,
            abort_on_first_failure,
        })
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            threads: self.engine_threads.max(1),
            hash_mb: self.engine_hash_mb.max(1),
        }
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_workers: self.max_workers.max(1),
            job_timeout: (self.job_timeout_secs > 0)
                .then(|| Duration::from_secs(self.job_timeout_secs)),
            batch_deadline: self.batch_deadline_secs.map(Duration::from_secs),
            abort_on_failure: self.abort_on_first_failure,
        }
    }
}
