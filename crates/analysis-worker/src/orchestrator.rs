//! Batch orchestration: one game in, one [`AnalysisRun`] out.
//!
//! A batch moves through [`BatchState`]s in a fixed order. The game is
//! replayed first, so an illegal move fails the batch before any evaluator
//! session is opened. Distinct positions become jobs for a [`WorkerPool`];
//! their results are collected by position key and joined back onto the
//! game's plies.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chess_core::{parse_pgn, validate_fen, Position, Reconstructor};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::error::{AnalysisError, EvaluatorFailure};
use crate::evaluator::{Depth, EvaluationJob, EvaluationResult, Evaluator, EvaluatorFactory};
use crate::pool::{default_workers, JobStream, WorkerPool};
use crate::report::{AnalysisRun, GameAnalysis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchState {
    Pending,
    Expanding,
    Dispatching,
    Collecting,
    Joining,
    Done,
    Failed,
}

impl BatchState {
    pub fn can_advance_to(self, next: BatchState) -> bool {
        use BatchState::*;
        matches!(
            (self, next),
            (Pending, Expanding)
                | (Expanding, Dispatching)
                | (Dispatching, Collecting)
                | (Collecting, Joining)
                | (Joining, Done)
                | (Expanding | Dispatching | Collecting, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BatchState::Done | BatchState::Failed)
    }
}

/// One game to analyse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRequest {
    /// SAN tokens in game order
    pub moves: Vec<String>,
    /// Standard start position when `None`
    pub start_fen: Option<String>,
    pub depth: Depth,
    /// Overrides the configured worker count
    pub max_workers: Option<usize>,
    /// Overrides the configured failure policy
    pub abort_on_failure: Option<bool>,
}

impl GameRequest {
    pub fn new(moves: Vec<String>, depth: Depth) -> Self {
        Self {
            moves,
            start_fen: None,
            depth,
            max_workers: None,
            abort_on_failure: None,
        }
    }

    pub fn with_start_fen(mut self, fen: Option<String>) -> Self {
        self.start_fen = fen;
        self
    }

    pub fn with_max_workers(mut self, workers: Option<usize>) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn with_abort_on_failure(mut self, abort: bool) -> Self {
        self.abort_on_failure = Some(abort);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub max_workers: usize,
    pub job_timeout: Option<Duration>,
    pub batch_deadline: Option<Duration>,
    pub abort_on_failure: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_workers: default_workers(),
            job_timeout: Some(Duration::from_secs(30)),
            batch_deadline: None,
            abort_on_failure: false,
        }
    }
}

/// Validates and logs state changes, and reports them to the observer.
struct Tracker<O> {
    state: BatchState,
    observe: O,
}

impl<O: FnMut(BatchState)> Tracker<O> {
    fn advance(&mut self, next: BatchState) {
        if !self.state.can_advance_to(next) {
            warn!(from = ?self.state, to = ?next, "Unexpected batch transition");
        }
        debug!(from = ?self.state, to = ?next, "Batch transition");
        self.state = next;
        (self.observe)(next);
    }

    fn fail(&mut self, err: AnalysisError) -> AnalysisError {
        if !self.state.is_terminal() {
            self.advance(BatchState::Failed);
        }
        err
    }
}

pub struct Orchestrator<F: EvaluatorFactory> {
    factory: Arc<F>,
    config: OrchestratorConfig,
}

impl<F: EvaluatorFactory> Orchestrator<F> {
    pub fn new(factory: F, config: OrchestratorConfig) -> Self {
        Self {
            factory: Arc::new(factory),
            config,
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Evaluate a single position on a short-lived session.
    pub async fn evaluate_position(&self, fen: &str, depth: Depth) -> Result<EvaluationResult, AnalysisError> {
        validate_fen(fen)?;
        let fen = fen.trim();
        let evaluator_error = |source: EvaluatorFailure| AnalysisError::Evaluator {
            fen: fen.to_string(),
            source,
        };

        let mut session = self.factory.open().await.map_err(evaluator_error)?;
        let result = match self.config.job_timeout {
            Some(limit) => tokio::time::timeout(limit, session.evaluate(fen, depth))
                .await
                .unwrap_or(Err(EvaluatorFailure::Timeout(limit))),
            None => session.evaluate(fen, depth).await,
        };
        match result {
            Ok(result) => {
                session.close().await;
                Ok(result)
            }
            // A failed session is dropped, not closed
            Err(failure) => Err(evaluator_error(failure)),
        }
    }

    /// Parse a PGN and analyse its first game.
    pub async fn analyze_pgn(
        &self,
        pgn: &str,
        depth: Depth,
        max_workers: Option<usize>,
    ) -> Result<AnalysisRun, AnalysisError> {
        let game = parse_pgn(pgn)?;
        let request = GameRequest::new(game.moves, depth)
            .with_start_fen(game.headers.start_fen)
            .with_max_workers(max_workers);
        self.analyze_game(request).await
    }

    pub async fn analyze_game(&self, request: GameRequest) -> Result<AnalysisRun, AnalysisError> {
        self.analyze_game_observed(request, |_| {}).await
    }

    /// Like [`Orchestrator::analyze_game`], reporting every state change to `observe`.
    pub async fn analyze_game_observed(
        &self,
        request: GameRequest,
        observe: impl FnMut(BatchState) + Send,
    ) -> Result<AnalysisRun, AnalysisError> {
        let started = Instant::now();
        let mut tracker = Tracker {
            state: BatchState::Pending,
            observe,
        };

        tracker.advance(BatchState::Expanding);
        let positions = Reconstructor::with_start(request.start_fen.as_deref())
            .and_then(|r| r.expand(&request.moves))
            .map_err(|e| tracker.fail(e.into()))?;

        tracker.advance(BatchState::Dispatching);
        let jobs = distinct_jobs(&positions, request.depth);
        let workers = request.max_workers.unwrap_or(self.config.max_workers).max(1);
        let pool = WorkerPool::new(Arc::clone(&self.factory), workers)
            .with_job_timeout(self.config.job_timeout);
        let stream = pool.submit(jobs.clone()).await.map_err(|e| tracker.fail(e))?;
        let workers_used = stream.workers();

        tracker.advance(BatchState::Collecting);
        let abort = request.abort_on_failure.unwrap_or(self.config.abort_on_failure);
        let Collected {
            evaluations,
            assignments,
        } = self
            .collect(stream, &jobs, abort)
            .await
            .map_err(|e| tracker.fail(e))?;

        tracker.advance(BatchState::Joining);
        let analysis = GameAnalysis::assemble(&positions, &evaluations);

        let run = AnalysisRun {
            analysis,
            depth: request.depth,
            workers_used,
            elapsed: started.elapsed(),
            total_positions: positions.len(),
            distinct_positions: jobs.len(),
            assignments,
        };
        info!(
            positions = run.total_positions,
            distinct = run.distinct_positions,
            workers = run.workers_used,
            unanalyzed = run.analysis.unanalyzed(),
            elapsed_ms = run.elapsed.as_millis() as u64,
            "Game analysis complete"
        );
        tracker.advance(BatchState::Done);
        Ok(run)
    }

    /// Drain the stream into maps keyed by position key.
    async fn collect(
        &self,
        mut stream: JobStream,
        jobs: &[EvaluationJob],
        abort_on_failure: bool,
    ) -> Result<Collected, AnalysisError> {
        let mut evaluations = HashMap::with_capacity(jobs.len());
        let mut assignments = BTreeMap::new();
        let deadline = self
            .config
            .batch_deadline
            .map(|limit| tokio::time::Instant::now() + limit);

        while evaluations.len() < stream.total() {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, stream.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            outstanding = stream.total() - evaluations.len(),
                            "Batch deadline elapsed"
                        );
                        stream.cancel();
                        break;
                    }
                },
                None => stream.next().await,
            };

            // Every worker has exited
            let Some(outcome) = next else { break };
            assignments.insert(outcome.job.key.clone(), outcome.worker_id);

            match outcome.result {
                Ok(result) => {
                    evaluations.insert(outcome.job.key, Ok(result));
                }
                Err(failure) if abort_on_failure => {
                    stream.cancel();
                    return Err(AnalysisError::Evaluator {
                        fen: outcome.job.fen,
                        source: failure,
                    });
                }
                Err(failure) => {
                    evaluations.insert(outcome.job.key, Err(failure.to_string()));
                }
            }
        }

        let reason = if deadline.is_some_and(|at| tokio::time::Instant::now() >= at) {
            "deadline elapsed"
        } else {
            "worker exited before evaluating"
        };
        for job in jobs {
            evaluations
                .entry(job.key.clone())
                .or_insert_with(|| Err(reason.to_string()));
        }

        Ok(Collected {
            evaluations,
            assignments,
        })
    }
}

struct Collected {
    evaluations: HashMap<String, Result<EvaluationResult, String>>,
    /// Worker that handled each position key
    assignments: BTreeMap<String, usize>,
}

/// One job per distinct position key, in first-occurrence order.
fn distinct_jobs(positions: &[Position], depth: Depth) -> Vec<EvaluationJob> {
    let mut seen = HashSet::new();
    positions
        .iter()
        .filter(|p| seen.insert(p.key.clone()))
        .enumerate()
        .map(|(job_id, p)| EvaluationJob {
            job_id,
            fen: p.fen.clone(),
            key: p.key.clone(),
            depth,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{RawScore, Score};
    use crate::stub::StubFactory;
    use std::sync::Mutex;

    fn moves(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn depth(n: i64) -> Depth {
        Depth::new(n).unwrap()
    }

    fn orchestrator(factory: StubFactory) -> Orchestrator<StubFactory> {
        Orchestrator::new(
            factory,
            OrchestratorConfig {
                max_workers: 4,
                ..OrchestratorConfig::default()
            },
        )
    }

    #[test]
    fn test_state_transitions() {
        assert!(BatchState::Pending.can_advance_to(BatchState::Expanding));
        assert!(BatchState::Collecting.can_advance_to(BatchState::Failed));
        assert!(!BatchState::Pending.can_advance_to(BatchState::Collecting));
        assert!(!BatchState::Done.can_advance_to(BatchState::Failed));
        assert!(!BatchState::Joining.can_advance_to(BatchState::Failed));
        assert!(BatchState::Done.is_terminal());
    }

    #[test]
    fn test_tracker_does_not_fail_a_finished_batch() {
        let mut seen: Vec<BatchState> = Vec::new();
        let mut tracker = Tracker {
            state: BatchState::Joining,
            observe: |state: BatchState| seen.push(state),
        };
        tracker.advance(BatchState::Done);
        let err = tracker.fail(AnalysisError::Validation("late".into()));
        assert!(matches!(err, AnalysisError::Validation(_)));
        assert_eq!(tracker.state, BatchState::Done);
        drop(tracker);
        assert_eq!(seen, vec![BatchState::Done]);
    }

    #[test]
    fn test_distinct_jobs_first_occurrence_wins() {
        let positions = Reconstructor::standard()
            .expand(&["Nf3", "Nf6", "Ng1", "Ng8", "e4"])
            .unwrap();
        let jobs = distinct_jobs(&positions, depth(3));
        assert_eq!(jobs.len(), 5);
        assert_eq!(jobs[0].fen, positions[0].fen);
        let ids: Vec<usize> = jobs.iter().map(|j| j.job_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(jobs[4].fen, positions[5].fen);
    }

    #[tokio::test]
    async fn test_states_observed_in_order() {
        let seen = Mutex::new(Vec::new());
        let run = orchestrator(StubFactory::new())
            .analyze_game_observed(GameRequest::new(moves(&["e4", "e5"]), depth(3)), |s| {
                seen.lock().unwrap().push(s)
            })
            .await
            .unwrap();
        assert_eq!(run.total_positions, 3);
        assert_eq!(
            seen.into_inner().unwrap(),
            vec![
                BatchState::Expanding,
                BatchState::Dispatching,
                BatchState::Collecting,
                BatchState::Joining,
                BatchState::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_illegal_move_fails_before_any_session() {
        let factory = StubFactory::new();
        let orch = orchestrator(factory.clone());
        let mut states = Vec::new();
        let err = orch
            .analyze_game_observed(
                GameRequest::new(moves(&["e4", "e5", "Nf9"]), depth(3)),
                |s| states.push(s),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AnalysisError::IllegalMove {
                ply: 2,
                san: "Nf9".into()
            }
        );
        assert_eq!(states.last(), Some(&BatchState::Failed));
        assert_eq!(factory.opens(), 0);
        assert_eq!(factory.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_position_is_unanalyzed() {
        let positions = Reconstructor::standard().expand(&["d4", "d5", "c4"]).unwrap();
        let factory = StubFactory::new().failing(&positions[2].fen);
        let mut states = Vec::new();
        let run = orchestrator(factory)
            .analyze_game_observed(
                GameRequest::new(moves(&["d4", "d5", "c4"]), depth(3)),
                |s| states.push(s),
            )
            .await
            .unwrap();
        assert_eq!(run.analysis.unanalyzed(), 1);
        assert!(!states.contains(&BatchState::Failed));
        let failed = run.analysis.position(&positions[2].fen).unwrap();
        assert!(failed.error.as_deref().unwrap_or_default().contains("stub failure"));
    }

    #[tokio::test]
    async fn test_abort_on_failure() {
        let positions = Reconstructor::standard().expand(&["d4", "d5"]).unwrap();
        let factory = StubFactory::new().failing(&positions[1].fen);
        let err = orchestrator(factory)
            .analyze_game(GameRequest::new(moves(&["d4", "d5"]), depth(3)).with_abort_on_failure(true))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Evaluator { ref fen, .. } if *fen == positions[1].fen));
    }

    #[tokio::test]
    async fn test_batch_deadline_marks_outstanding() {
        let positions = Reconstructor::standard().expand(&["e4", "e5"]).unwrap();
        let factory = StubFactory::new().hanging(&positions[2].fen);
        let orch = Orchestrator::new(
            factory,
            OrchestratorConfig {
                max_workers: 3,
                job_timeout: None,
                batch_deadline: Some(Duration::from_millis(100)),
                abort_on_failure: false,
            },
        );
        let run = orch
            .analyze_game(GameRequest::new(moves(&["e4", "e5"]), depth(3)))
            .await
            .unwrap();
        let stuck = run.analysis.position(&positions[2].fen).unwrap();
        assert_eq!(stuck.error.as_deref(), Some("deadline elapsed"));
        assert_eq!(run.analysis.unanalyzed(), 1);
    }

    #[tokio::test]
    async fn test_scheduler_exhaustion() {
        let err = orchestrator(StubFactory::new().unopenable())
            .analyze_game(GameRequest::new(moves(&["e4"]), depth(3)))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::SchedulerExhaustion(_)));
    }

    #[tokio::test]
    async fn test_analyze_pgn_uses_fen_header() {
        let pgn = "[SetUp \"1\"]\n[FEN \"4k3/8/8/8/8/8/4P3/4K3 w - - 0 1\"]\n\n1. e4 Kd7 *";
        let run = orchestrator(StubFactory::new())
            .analyze_pgn(pgn, depth(2), Some(1))
            .await
            .unwrap();
        assert_eq!(run.total_positions, 3);
        assert_eq!(run.workers_used, 1);
        assert!(run
            .analysis
            .position("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1")
            .is_some());
    }

    #[tokio::test]
    async fn test_evaluate_position() {
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
        let orch = orchestrator(StubFactory::new().with_score(fen, RawScore::Centipawns(30)));
        let result = orch.evaluate_position(fen, depth(4)).await.unwrap();
        assert_eq!(result.score, Score::Centipawns(-30));

        let err = orch.evaluate_position("nonsense", depth(4)).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
    }
}
