//! Board facade over shakmaty.
//!
//! Everything the analysis pipeline needs from the rules library goes through
//! [`Board`]: applying a move, listing legal moves, game-over detection and FEN
//! output. Nothing else in the workspace touches shakmaty positions directly.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position as _};

use crate::error::ChessError;

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Side to move, serialized as `"white"` / `"black"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opponent(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    /// +1 for White, -1 for Black.
    pub fn sign(self) -> i32 {
        match self {
            Side::White => 1,
            Side::Black => -1,
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

/// A move that was successfully applied to a [`Board`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    /// SAN as generated by the rules library (with check suffix)
    pub san: String,
    /// UCI coordinate notation
    pub uci: String,
}

#[derive(Debug, Clone)]
pub struct Board {
    pos: Chess,
}

impl Default for Board {
    fn default() -> Self {
        Self::standard()
    }
}

impl Board {
    /// Standard starting position.
    pub fn standard() -> Self {
        Self {
            pos: Chess::default(),
        }
    }

    /// Parse a FEN string into a legal position.
    pub fn from_fen(fen: &str) -> Result<Self, ChessError> {
        let trimmed = fen.trim();
        if trimmed.is_empty() {
            return Err(ChessError::InvalidFen("empty FEN".into()));
        }
        let parsed: Fen = trimmed
            .parse()
            .map_err(|e| ChessError::InvalidFen(format!("{trimmed}: {e}")))?;
        let pos: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| ChessError::InvalidFen(format!("{trimmed}: {e}")))?;
        Ok(Self { pos })
    }

    pub fn to_fen(&self) -> String {
        Fen::from_position(&self.pos, EnPassantMode::Legal).to_string()
    }

    /// FEN without the move clocks, see [`position_key`].
    pub fn key(&self) -> String {
        position_key(&self.to_fen())
    }

    pub fn turn(&self) -> Side {
        self.pos.turn().into()
    }

    /// Legal moves in SAN.
    pub fn legal_moves(&self) -> Vec<String> {
        self.pos
            .legal_moves()
            .into_iter()
            .map(|mv| San::from_move(&self.pos, mv).to_string())
            .collect()
    }

    pub fn legal_move_count(&self) -> usize {
        self.pos.legal_moves().len()
    }

    pub fn is_game_over(&self) -> bool {
        self.pos.is_game_over()
    }

    pub fn is_checkmate(&self) -> bool {
        self.pos.is_checkmate()
    }

    /// Apply a SAN token. Returns `None` when the token does not parse or
    /// names an illegal move; the board is left untouched in that case.
    pub fn apply_san(&mut self, token: &str) -> Option<AppliedMove> {
        let cleaned = normalize_castling(strip_annotations(token));
        let san_plus: SanPlus = cleaned.parse().ok()?;
        let mv = san_plus.san.to_move(&self.pos).ok()?;

        let mut san = San::from_move(&self.pos, mv.clone()).to_string();
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        self.pos.play_unchecked(mv);

        if self.pos.is_checkmate() {
            san.push('#');
        } else if self.pos.is_check() {
            san.push('+');
        }
        Some(AppliedMove { san, uci })
    }

    /// Convert an engine move (e.g. `g1f3`) to SAN in this position.
    pub fn uci_to_san(&self, uci: &str) -> Option<String> {
        let uci_move: UciMove = uci.parse().ok()?;
        let legal_move = uci_move.to_move(&self.pos).ok()?;
        Some(San::from_move(&self.pos, legal_move).to_string())
    }
}

/// Deduplication key: the FEN minus halfmove and fullmove clocks.
///
/// Two move orders that reach the same board with the same side to move,
/// castling rights and en-passant square share a key even though their full
/// FENs differ in the move counters.
pub fn position_key(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

/// Syntax and legality check for a client-supplied FEN.
pub fn validate_fen(fen: &str) -> Result<(), ChessError> {
    Board::from_fen(fen).map(|_| ())
}

/// Strip trailing annotation glyphs (`!`, `?`) from a SAN token.
pub fn strip_annotations(token: &str) -> &str {
    token.trim().trim_end_matches(['!', '?'])
}

/// Castling written with zeros (`0-0`, `0-0-0`) as some exporters do.
fn normalize_castling(token: &str) -> Cow<'_, str> {
    if token.starts_with("0-0") {
        Cow::Owned(token.replacen("0-0-0", "O-O-O", 1).replacen("0-0", "O-O", 1))
    } else {
        Cow::Borrowed(token)
    }
}
