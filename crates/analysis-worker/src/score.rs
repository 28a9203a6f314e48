//! Score normalization.
//!
//! Engines report scores relative to the side to move. Everything past the
//! evaluator boundary works with [`Score`], which is always from White's
//! perspective: positive is good for White regardless of whose turn it is.
//!
//! For comparisons across the mate/non-mate boundary every score projects onto
//! one integer scale with [`Score::to_centipawns`]:
//!
//! | score                  | projection             |
//! |------------------------|------------------------|
//! | `Centipawns(c)`        | `c` clamped to ±9000   |
//! | White mates in `n`     | `10000 - n`            |
//! | Black mates in `n`     | `-(10000 - n)`         |
//!
//! Decoding a projected value `v`: if `|v| > 9000` it is a mate in
//! `10000 - |v|` moves for the side given by the sign of `v`.

use chess_core::Side;
use serde::{Deserialize, Serialize};

/// Magnitude of an immediate mate on the projected scale.
pub const MATE_SCORE: i32 = 10_000;

/// Projected values beyond this are mates.
pub const MATE_THRESHOLD: i32 = 9_000;

/// Mate distances are capped so they stay above [`MATE_THRESHOLD`].
const MAX_MATE_MOVES: u32 = 999;

/// Largest magnitude accepted from an engine, in centipawns or moves.
pub const MAX_RAW_MAGNITUDE: i32 = 100_000;

/// Score as reported by an engine, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawScore {
    Centipawns(i32),
    /// Moves to mate; negative when the reporting side is getting mated
    Mate(i32),
}

impl RawScore {
    /// Combine the optional `cp`/`mate` fields of a UCI info line.
    pub fn from_parts(cp: Option<i32>, mate: Option<i32>) -> Option<Self> {
        match (mate, cp) {
            (Some(m), _) => Some(RawScore::Mate(m)),
            (None, Some(c)) => Some(RawScore::Centipawns(c)),
            (None, None) => None,
        }
    }

    /// Whether the value is small enough to be a real engine score.
    pub fn in_range(self) -> bool {
        let value = match self {
            RawScore::Centipawns(v) | RawScore::Mate(v) => v,
        };
        value.checked_abs().is_some_and(|v| v <= MAX_RAW_MAGNITUDE)
    }
}

fn signed_moves(moves: u32) -> i32 {
    i32::try_from(moves).unwrap_or(i32::MAX)
}

/// Position evaluation from White's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "ScoreRepr", try_from = "ScoreRepr")]
pub enum Score {
    Centipawns(i32),
    /// `moves == 0` means the loser is already checkmated
    Mate { winner: Side, moves: u32 },
}

impl Score {
    /// Normalize a score reported relative to `turn`, the side to move.
    ///
    /// A UCI `mate 0` means the side to move is checkmated.
    pub fn from_side_to_move(raw: RawScore, turn: Side) -> Self {
        match raw {
            RawScore::Centipawns(cp) => Score::Centipawns(cp.saturating_mul(turn.sign())),
            RawScore::Mate(n) if n > 0 => Score::Mate {
                winner: turn,
                moves: n.unsigned_abs(),
            },
            RawScore::Mate(n) => Score::Mate {
                winner: turn.opponent(),
                moves: n.unsigned_abs(),
            },
        }
    }

    /// Normalize a score that is already from White's perspective.
    ///
    /// `turn` only matters for `mate 0`, where the sign carries no winner.
    pub fn from_white(raw: RawScore, turn: Side) -> Self {
        match raw {
            RawScore::Centipawns(cp) => Score::Centipawns(cp),
            RawScore::Mate(0) => Score::Mate {
                winner: turn.opponent(),
                moves: 0,
            },
            RawScore::Mate(n) => Score::Mate {
                winner: if n > 0 { Side::White } else { Side::Black },
                moves: n.unsigned_abs(),
            },
        }
    }

    /// Project onto the single ordered integer scale described in the module docs.
    pub fn to_centipawns(self) -> i32 {
        match self {
            Score::Centipawns(cp) => cp.clamp(-MATE_THRESHOLD, MATE_THRESHOLD),
            Score::Mate { winner, moves } => {
                winner.sign() * (MATE_SCORE - moves.min(MAX_MATE_MOVES) as i32)
            }
        }
    }

    /// Inverse of [`Score::to_centipawns`].
    pub fn from_centipawns(value: i32) -> Self {
        let magnitude = value.abs().min(MATE_SCORE);
        if magnitude > MATE_THRESHOLD {
            Score::Mate {
                winner: if value > 0 { Side::White } else { Side::Black },
                moves: (MATE_SCORE - magnitude) as u32,
            }
        } else {
            Score::Centipawns(value)
        }
    }

    pub fn is_mate(self) -> bool {
        matches!(self, Score::Mate { .. })
    }

    /// Signed moves to mate, positive when White mates.
    pub fn mate_distance(self) -> Option<i32> {
        match self {
            Score::Mate { winner, moves } => Some(winner.sign() * signed_moves(moves)),
            Score::Centipawns(_) => None,
        }
    }

    /// Projected value from `side`'s point of view.
    pub fn for_side(self, side: Side) -> i32 {
        self.to_centipawns() * side.sign()
    }
}

/// Wire form: `{"type":"cp","value":35}` or
/// `{"type":"mate","value":-3,"winner":"black"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScoreRepr {
    #[serde(rename = "type")]
    kind: ScoreKind,
    value: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    winner: Option<Side>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ScoreKind {
    Cp,
    Mate,
}

impl From<Score> for ScoreRepr {
    fn from(score: Score) -> Self {
        match score {
            Score::Centipawns(value) => ScoreRepr {
                kind: ScoreKind::Cp,
                value,
                winner: None,
            },
            Score::Mate { winner, moves } => ScoreRepr {
                kind: ScoreKind::Mate,
                value: winner.sign() * signed_moves(moves),
                winner: Some(winner),
            },
        }
    }
}

impl TryFrom<ScoreRepr> for Score {
    type Error = String;

    fn try_from(repr: ScoreRepr) -> Result<Self, Self::Error> {
        match repr.kind {
            ScoreKind::Cp => Ok(Score::Centipawns(repr.value)),
            ScoreKind::Mate => {
                let winner = match (repr.winner, repr.value) {
                    (Some(w), _) => w,
                    (None, v) if v > 0 => Side::White,
                    (None, v) if v < 0 => Side::Black,
                    (None, _) => return Err("mate 0 needs an explicit winner".to_string()),
                };
                Ok(Score::Mate {
                    winner,
                    moves: repr.value.unsigned_abs(),
                })
            }
        }
    }
}
