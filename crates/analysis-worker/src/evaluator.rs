//! Position evaluator contract.
//!
//! An [`EvaluatorFactory`] opens [`Evaluator`] sessions. A session is owned by
//! exactly one worker for its whole life and is closed explicitly, or killed
//! when dropped.

use std::fmt;
use std::future::Future;

use chess_core::Board;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, EvaluatorFailure};
use crate::score::{RawScore, Score};

/// Search depth in plies, always within `1..=25`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Depth(u8);

impl Depth {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 25;

    /// Validate a client-supplied depth.
    pub fn new(value: i64) -> Result<Self, AnalysisError> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(AnalysisError::Validation(format!(
                "Depth must be between {} and {}",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One distinct position waiting to be evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationJob {
    pub job_id: usize,
    pub fen: String,
    pub key: String,
    pub depth: Depth,
}

/// Which side an engine-reported score is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    /// UCI engines report for the side to move
    SideToMove,
    White,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub fen: String,
    /// UCI notation; `None` when the position has no legal moves
    pub best_move: Option<String>,
    pub best_move_san: Option<String>,
    /// White perspective
    pub score: Score,
    pub is_mate: bool,
    /// Signed moves to mate, positive when White mates
    pub mate_distance: Option<i32>,
    /// Depth the search actually reached
    pub depth: u32,
    /// Principal variation in UCI notation, when the engine reports one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pv: Vec<String>,
}

impl EvaluationResult {
    /// Build a result from an engine-native score.
    ///
    /// This is the only place scores change perspective and engine moves are
    /// turned into SAN.
    pub fn from_engine(
        fen: &str,
        best_move: Option<&str>,
        raw: RawScore,
        perspective: Perspective,
        depth: u32,
    ) -> Result<Self, EvaluatorFailure> {
        if !raw.in_range() {
            return Err(EvaluatorFailure::Parse(format!("score out of range: {raw:?}")));
        }
        let board = Board::from_fen(fen).map_err(|e| EvaluatorFailure::Parse(e.to_string()))?;
        let turn = board.turn();

        let score = match perspective {
            Perspective::SideToMove => Score::from_side_to_move(raw, turn),
            Perspective::White => Score::from_white(raw, turn),
        };

        let best_move = best_move
            .map(str::trim)
            .filter(|m| !m.is_empty() && *m != "(none)" && *m != "0000")
            .map(str::to_string);
        let best_move_san = best_move.as_deref().and_then(|m| board.uci_to_san(m));

        Ok(Self {
            fen: fen.to_string(),
            best_move,
            best_move_san,
            score,
            is_mate: score.is_mate(),
            mate_distance: score.mate_distance(),
            depth,
            pv: Vec::new(),
        })
    }

    pub fn with_pv(mut self, pv: Vec<String>) -> Self {
        self.pv = pv;
        self
    }
}

/// A live evaluator session.
pub trait Evaluator: Send + Sized {
    fn evaluate(
        &mut self,
        fen: &str,
        depth: Depth,
    ) -> impl Future<Output = Result<EvaluationResult, EvaluatorFailure>> + Send;

    /// Shut the session down cleanly. Dropping without closing kills it.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens evaluator sessions; shared by every worker of a pool.
pub trait EvaluatorFactory: Send + Sync + 'static {
    type Evaluator: Evaluator + 'static;

    fn open(&self) -> impl Future<Output = Result<Self::Evaluator, EvaluatorFailure>> + Send;

    /// Short label for logs and health output.
    fn name(&self) -> &str;
}
