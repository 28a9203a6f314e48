//! Aggregated per-game analysis.
//!
//! [`GameAnalysis`] is deterministic for a given move list and evaluator:
//! timing lives in [`AnalysisRun`] so two runs can be compared structurally.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chess_core::{position_key, Position, Side};
use serde::Serialize;

use crate::analysis::{assess, calculate_accuracy, Classifications, MoveClass};
use crate::evaluator::{Depth, EvaluationResult};
use crate::score::Score;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Analyzed,
    Unanalyzed,
}

/// Everything known about one distinct position of a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionRecord {
    /// Full FEN of the first occurrence
    pub fen: String,
    pub turn: Side,
    /// Every ply at which this position occurred, ascending
    pub plies: Vec<usize>,
    pub status: PositionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub best_move: Option<String>,
    pub best_move_san: Option<String>,
    pub evaluation: Option<Score>,
    pub is_mate: bool,
    pub mate_distance: Option<i32>,
    pub depth: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pv: Vec<String>,

    // First occurrence only
    pub move_played: Option<String>,
    pub move_played_uci: Option<String>,
    pub move_played_evaluation: Option<Score>,
    pub best_move_evaluation: Option<Score>,
    pub cp_loss: Option<i32>,
    pub classification: Option<MoveClass>,
}

impl PositionRecord {
    fn new(position: &Position, evaluation: Option<&Result<EvaluationResult, String>>) -> Self {
        let mut record = Self {
            fen: position.fen.clone(),
            turn: position.turn,
            plies: vec![position.ply],
            status: PositionStatus::Unanalyzed,
            error: None,
            best_move: None,
            best_move_san: None,
            evaluation: None,
            is_mate: false,
            mate_distance: None,
            depth: None,
            pv: Vec::new(),
            move_played: None,
            move_played_uci: None,
            move_played_evaluation: None,
            best_move_evaluation: None,
            cp_loss: None,
            classification: None,
        };

        match evaluation {
            Some(Ok(result)) => {
                record.status = PositionStatus::Analyzed;
                record.best_move = result.best_move.clone();
                record.best_move_san = result.best_move_san.clone();
                record.evaluation = Some(result.score);
                record.is_mate = result.is_mate;
                record.mate_distance = result.mate_distance;
                record.depth = Some(result.depth);
                record.pv = result.pv.clone();
            }
            Some(Err(message)) => record.error = Some(message.clone()),
            None => record.error = Some("not evaluated".into()),
        }
        record
    }

    pub fn is_analyzed(&self) -> bool {
        self.status == PositionStatus::Analyzed
    }
}

/// One half-move of the game, joined with the evaluations around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveRecord {
    pub ply: usize,
    pub side: Side,
    pub san: String,
    pub uci: String,
    /// Position key before the move
    pub fen_before: String,
    /// Position key after the move
    pub fen_after: String,
    pub move_played_evaluation: Option<Score>,
    pub best_move_evaluation: Option<Score>,
    /// Engine's choice in the position before the move
    pub best_move_san: Option<String>,
    pub cp_loss: Option<i32>,
    pub classification: Option<MoveClass>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameAnalysis {
    /// Keyed by position key, one entry per distinct position
    pub positions: BTreeMap<String, PositionRecord>,
    /// Game order
    pub moves: Vec<MoveRecord>,
}

impl GameAnalysis {
    /// Join expanded positions with whatever evaluations came back.
    ///
    /// `evaluations` is keyed by position key; a missing key or an `Err`
    /// leaves the position unanalyzed.
    pub fn assemble(
        positions: &[Position],
        evaluations: &HashMap<String, Result<EvaluationResult, String>>,
    ) -> Self {
        let mut records: BTreeMap<String, PositionRecord> = BTreeMap::new();
        for position in positions {
            records
                .entry(position.key.clone())
                .and_modify(|record| record.plies.push(position.ply))
                .or_insert_with(|| PositionRecord::new(position, evaluations.get(&position.key)));
        }

        let score_of = |key: &str| records.get(key).and_then(|r| r.evaluation);

        let mut moves = Vec::with_capacity(positions.len().saturating_sub(1));
        for pair in positions.windows(2) {
            let (before, after) = (&pair[0], &pair[1]);
            let (Some(san), Some(uci)) = (&before.move_played, &before.move_played_uci) else {
                continue;
            };

            let best_eval = score_of(&before.key);
            let played_eval = score_of(&after.key);
            let quality = match (best_eval, played_eval) {
                (Some(best), Some(played)) => Some(assess(
                    best,
                    played,
                    before.turn,
                    after.is_checkmate,
                    before.legal_moves == 1,
                )),
                _ => None,
            };

            moves.push(MoveRecord {
                ply: before.ply,
                side: before.turn,
                san: san.clone(),
                uci: uci.clone(),
                fen_before: before.key.clone(),
                fen_after: after.key.clone(),
                move_played_evaluation: played_eval,
                best_move_evaluation: best_eval,
                best_move_san: records.get(&before.key).and_then(|r| r.best_move_san.clone()),
                cp_loss: quality.map(|q| q.cp_loss),
                classification: quality.map(|q| q.classification),
            });
        }

        for mv in &moves {
            if let Some(record) = records.get_mut(&mv.fen_before) {
                if record.plies.first() == Some(&mv.ply) {
                    record.move_played = Some(mv.san.clone());
                    record.move_played_uci = Some(mv.uci.clone());
                    record.move_played_evaluation = mv.move_played_evaluation;
                    record.best_move_evaluation = mv.best_move_evaluation;
                    record.cp_loss = mv.cp_loss;
                    record.classification = mv.classification;
                }
            }
        }

        Self {
            positions: records,
            moves,
        }
    }

    /// Look a position up by full FEN or by key.
    pub fn position(&self, fen: &str) -> Option<&PositionRecord> {
        self.positions.get(&position_key(fen))
    }

    pub fn unanalyzed(&self) -> usize {
        self.positions.values().filter(|r| !r.is_analyzed()).count()
    }

    pub fn summary(&self) -> GameSummary {
        let mut summary = GameSummary::default();
        for mv in &self.moves {
            let (Some(cp_loss), Some(class)) = (mv.cp_loss, mv.classification) else {
                continue;
            };
            let side = match mv.side {
                Side::White => &mut summary.white,
                Side::Black => &mut summary.black,
            };
            side.moves += 1;
            side.total_cp_loss += cp_loss;
            side.classifications.record(class);
        }
        summary.white.finish();
        summary.black.finish();
        summary
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GameSummary {
    pub white: SideSummary,
    pub black: SideSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideSummary {
    /// Moves with both evaluations available
    pub moves: u32,
    #[serde(skip)]
    total_cp_loss: i32,
    pub average_cp_loss: f64,
    pub accuracy: f64,
    pub classifications: Classifications,
}

impl Default for SideSummary {
    fn default() -> Self {
        Self {
            moves: 0,
            total_cp_loss: 0,
            average_cp_loss: 0.0,
            accuracy: 100.0,
            classifications: Classifications::default(),
        }
    }
}

impl SideSummary {
    fn finish(&mut self) {
        if self.moves > 0 {
            self.average_cp_loss = round_to(self.total_cp_loss as f64 / self.moves as f64, 1);
        }
        self.accuracy = round_to(calculate_accuracy(self.total_cp_loss, self.moves), 1);
    }
}

/// A finished batch: the analysis plus how it was produced.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub analysis: GameAnalysis,
    pub depth: Depth,
    pub workers_used: usize,
    pub elapsed: Duration,
    /// Positions in the game, counting repeats
    pub total_positions: usize,
    /// Jobs actually dispatched
    pub distinct_positions: usize,
    /// Worker id that handled each position key
    pub assignments: BTreeMap<String, usize>,
}

impl AnalysisRun {
    pub fn positions_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_positions as f64 / secs
        } else {
            0.0
        }
    }

    /// Positions handled by each worker id.
    pub fn positions_per_worker(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for worker_id in self.assignments.values() {
            *counts.entry(*worker_id).or_insert(0) += 1;
        }
        counts
    }

    /// The JSON body returned for a PGN analysis.
    pub fn report(&self) -> RunReport {
        RunReport {
            success: true,
            total_positions: self.total_positions,
            distinct_positions: self.distinct_positions,
            analysis_time: round_to(self.elapsed.as_secs_f64(), 2),
            workers_used: self.workers_used,
            positions_per_second: round_to(self.positions_per_second(), 1),
            depth: self.depth.get(),
            unanalyzed: self.analysis.unanalyzed(),
            results: self.analysis.positions.clone(),
            moves: self.analysis.moves.clone(),
            summary: self.analysis.summary(),
            worker_ids: self.assignments.clone(),
            positions_per_worker: self.positions_per_worker(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub success: bool,
    pub total_positions: usize,
    pub distinct_positions: usize,
    /// Seconds
    pub analysis_time: f64,
    pub workers_used: usize,
    pub positions_per_second: f64,
    pub depth: u8,
    pub unanalyzed: usize,
    pub results: BTreeMap<String, PositionRecord>,
    pub moves: Vec<MoveRecord>,
    pub summary: GameSummary,
    /// Position key to the worker that evaluated it
    pub worker_ids: BTreeMap<String, usize>,
    pub positions_per_worker: BTreeMap<usize, usize>,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
