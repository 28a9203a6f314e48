//! Deterministic in-memory evaluator for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chess_core::position_key;

use crate::error::EvaluatorFailure;
use crate::evaluator::{Depth, EvaluationResult, Evaluator, EvaluatorFactory, Perspective};
use crate::score::RawScore;

#[derive(Debug, Default)]
struct Counters {
    opens: AtomicUsize,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    order: Mutex<Vec<String>>,
}

/// Scores are engine-relative (side to move), keyed by position key so a
/// full FEN and its clock-less key both match.
#[derive(Debug, Clone, Default)]
pub struct StubFactory {
    scores: HashMap<String, RawScore>,
    best_moves: HashMap<String, String>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    delay: Option<Duration>,
    unopenable: bool,
    counters: Arc<Counters>,
}

impl StubFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_score(mut self, fen: &str, score: RawScore) -> Self {
        self.scores.insert(position_key(fen), score);
        self
    }

    pub fn with_best_move(mut self, fen: &str, uci: &str) -> Self {
        self.best_moves.insert(position_key(fen), uci.to_string());
        self
    }

    /// Evaluating `fen` fails with [`EvaluatorFailure::Engine`].
    pub fn failing(mut self, fen: &str) -> Self {
        self.failing.insert(position_key(fen));
        self
    }

    /// Evaluating `fen` never completes.
    pub fn hanging(mut self, fen: &str) -> Self {
        self.hanging.insert(position_key(fen));
        self
    }

    /// Every evaluation sleeps this long first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every `open` fails with [`EvaluatorFailure::Spawn`].
    pub fn unopenable(mut self) -> Self {
        self.unopenable = true;
        self
    }

    /// The deterministic score used for positions without an explicit one.
    pub fn default_score(fen: &str) -> RawScore {
        let key = position_key(fen);
        let spread = key.bytes().fold(0i32, |acc, b| (acc * 31 + b as i32) % 201);
        RawScore::Centipawns(spread - 100)
    }

    pub fn score_for(&self, fen: &str) -> RawScore {
        self.scores
            .get(&position_key(fen))
            .copied()
            .unwrap_or_else(|| Self::default_score(fen))
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    /// Highest number of evaluations observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Position keys in the order evaluations started.
    pub fn call_order(&self) -> Vec<String> {
        self.counters
            .order
            .lock()
            .map(|order| order.clone())
            .unwrap_or_default()
    }
}

impl EvaluatorFactory for StubFactory {
    type Evaluator = StubEvaluator;

    async fn open(&self) -> Result<StubEvaluator, EvaluatorFailure> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        if self.unopenable {
            return Err(EvaluatorFailure::Spawn("stub evaluator unavailable".into()));
        }
        Ok(StubEvaluator {
            factory: self.clone(),
        })
    }

    fn name(&self) -> &str {
        "stub"
    }
}

pub struct StubEvaluator {
    factory: StubFactory,
}

struct InFlight<'a>(&'a Counters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Evaluator for StubEvaluator {
    async fn evaluate(&mut self, fen: &str, depth: Depth) -> Result<EvaluationResult, EvaluatorFailure> {
        let factory = &self.factory;
        let key = position_key(fen);
        factory.counters.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut order) = factory.counters.order.lock() {
            order.push(key.clone());
        }
        let _guard = InFlight::enter(&factory.counters);

        if let Some(delay) = factory.delay {
            tokio::time::sleep(delay).await;
        }
        if factory.hanging.contains(&key) {
            std::future::pending::<()>().await;
        }
        if factory.failing.contains(&key) {
            return Err(EvaluatorFailure::Engine(format!("stub failure for {key}")));
        }

        EvaluationResult::from_engine(
            fen,
            factory.best_moves.get(&key).map(String::as_str),
            factory.score_for(fen),
            Perspective::SideToMove,
            depth.get() as u32,
        )
    }

    async fn close(self) {}
}
