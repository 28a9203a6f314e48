//! Move classification and accuracy, pure functions only

use chess_core::Side;
use serde::{Deserialize, Serialize};

use crate::score::{Score, MATE_THRESHOLD};

/// Classification thresholds (centipawn loss)
const THRESHOLD_BEST: i32 = 0;
const THRESHOLD_EXCELLENT: i32 = 10;
const THRESHOLD_GOOD: i32 = 50;
const THRESHOLD_INACCURACY: i32 = 100;
const THRESHOLD_MISTAKE: i32 = 200;

/// Maximum CP loss to cap at
const MAX_CP_LOSS: i32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveClass {
    Best,
    Excellent,
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
    /// Only one legal move was available
    Forced,
}

/// Quality of one played move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveQuality {
    pub cp_loss: i32,
    pub classification: MoveClass,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classifications {
    pub best: u32,
    pub excellent: u32,
    pub good: u32,
    pub inaccuracy: u32,
    pub mistake: u32,
    pub blunder: u32,
    pub forced: u32,
}

impl Classifications {
    pub fn record(&mut self, class: MoveClass) {
        let slot = match class {
            MoveClass::Best => &mut self.best,
            MoveClass::Excellent => &mut self.excellent,
            MoveClass::Good => &mut self.good,
            MoveClass::Inaccuracy => &mut self.inaccuracy,
            MoveClass::Mistake => &mut self.mistake,
            MoveClass::Blunder => &mut self.blunder,
            MoveClass::Forced => &mut self.forced,
        };
        *slot += 1;
    }
}

/// Grade a move from the evaluation before it (best play) and after it.
///
/// Both scores are from White's perspective; `mover` is the side that played.
pub fn assess(
    best: Score,
    played: Score,
    mover: Side,
    delivers_mate: bool,
    forced: bool,
) -> MoveQuality {
    if forced {
        return MoveQuality {
            cp_loss: 0,
            classification: MoveClass::Forced,
        };
    }

    let is_white = mover == Side::White;
    let best_eval = best.to_centipawns();
    let after_eval = played.to_centipawns();

    let cp_loss = calculate_cp_loss(best_eval, after_eval, is_white, delivers_mate);
    let mate_blunder = is_mate_blunder(best_eval, after_eval, is_white, delivers_mate);

    MoveQuality {
        cp_loss,
        classification: classify_move(cp_loss, mate_blunder),
    }
}

fn is_mate_position(eval: i32) -> bool {
    eval.abs() > MATE_THRESHOLD
}

/// Throwing away a forced mate, or walking into one, on the projected scale.
pub fn is_mate_blunder(best_eval: i32, after_eval: i32, is_white: bool, is_checkmate: bool) -> bool {
    if is_checkmate {
        return false;
    }

    let favours_mover = |eval: i32| if is_white { eval > 0 } else { eval < 0 };
    let best_is_mate = is_mate_position(best_eval);
    let after_is_mate = is_mate_position(after_eval);

    if best_is_mate && !after_is_mate {
        return favours_mover(best_eval);
    }

    if !best_is_mate && after_is_mate {
        return !favours_mover(after_eval);
    }

    false
}

pub fn calculate_cp_loss(best_eval: i32, after_eval: i32, is_white: bool, is_checkmate: bool) -> i32 {
    if is_checkmate {
        return 0;
    }

    let best_is_mate = is_mate_position(best_eval);
    let after_is_mate = is_mate_position(after_eval);

    if best_is_mate && after_is_mate {
        if (best_eval > 0) == (after_eval > 0) {
            return 0;
        } else {
            return MAX_CP_LOSS;
        }
    }

    let cp_loss = if is_white {
        best_eval - after_eval
    } else {
        after_eval - best_eval
    };

    cp_loss.clamp(0, MAX_CP_LOSS)
}

pub fn classify_move(cp_loss: i32, is_mate_blunder: bool) -> MoveClass {
    if is_mate_blunder {
        return MoveClass::Blunder;
    }
    if cp_loss <= THRESHOLD_BEST {
        MoveClass::Best
    } else if cp_loss < THRESHOLD_EXCELLENT {
        MoveClass::Excellent
    } else if cp_loss < THRESHOLD_GOOD {
        MoveClass::Good
    } else if cp_loss < THRESHOLD_INACCURACY {
        MoveClass::Inaccuracy
    } else if cp_loss < THRESHOLD_MISTAKE {
        MoveClass::Mistake
    } else {
        MoveClass::Blunder
    }
}

pub fn calculate_accuracy(total_cp_loss: i32, move_count: u32) -> f64 {
    if move_count == 0 {
        return 100.0;
    }
    let acpl = total_cp_loss as f64 / move_count as f64;
    let accuracy = 100.0 * (1.0 / (1.0 + acpl / 100.0)).sqrt();
    accuracy.clamp(0.0, 100.0)
}
