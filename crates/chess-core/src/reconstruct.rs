//! Game reconstruction: replay a SAN move list and record every position.

use serde::{Deserialize, Serialize};

use crate::board::{strip_annotations, Board, Side, STANDARD_START_FEN};
use crate::error::ChessError;

/// One board state in a replayed game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// 0 = starting position
    pub ply: usize,
    pub fen: String,
    /// FEN without move clocks, shared by transpositions
    pub key: String,
    pub turn: Side,
    /// SAN token played from this position, as recorded in the source game
    pub move_played: Option<String>,
    /// UCI form of `move_played`
    pub move_played_uci: Option<String>,
    pub legal_moves: usize,
    pub is_checkmate: bool,
    pub is_game_over: bool,
}

/// A half-move joining two consecutive positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedMove {
    pub ply: usize,
    pub san: String,
    pub uci: String,
    pub from_fen: String,
    pub to_fen: String,
}

#[derive(Debug, Clone)]
pub struct Reconstructor {
    start: Board,
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self::standard()
    }
}

impl Reconstructor {
    pub fn standard() -> Self {
        Self {
            start: Board::standard(),
        }
    }

    /// Start from a custom position instead of the initial array.
    pub fn from_fen(fen: &str) -> Result<Self, ChessError> {
        Ok(Self {
            start: Board::from_fen(fen)?,
        })
    }

    /// Start from `fen` when given, otherwise the standard position.
    pub fn with_start(fen: Option<&str>) -> Result<Self, ChessError> {
        match fen {
            Some(f) if f.trim() != STANDARD_START_FEN => Self::from_fen(f),
            _ => Ok(Self::standard()),
        }
    }

    pub fn start_fen(&self) -> String {
        self.start.to_fen()
    }

    /// Replay `moves` and return `moves.len() + 1` positions.
    ///
    /// Stops at the first token the rules library rejects; nothing past that
    /// point is defined, so no partial list is returned.
    pub fn expand<S: AsRef<str>>(&self, moves: &[S]) -> Result<Vec<Position>, ChessError> {
        let mut board = self.start.clone();
        let mut positions = Vec::with_capacity(moves.len() + 1);
        positions.push(snapshot(&board, 0));

        for (ply, token) in moves.iter().enumerate() {
            let token = token.as_ref();
            let applied = board.apply_san(token).ok_or_else(|| ChessError::IllegalMove {
                ply,
                san: token.to_string(),
            })?;

            if let Some(before) = positions.last_mut() {
                before.move_played = Some(strip_annotations(token).to_string());
                before.move_played_uci = Some(applied.uci);
            }
            positions.push(snapshot(&board, ply + 1));
        }

        Ok(positions)
    }
}

fn snapshot(board: &Board, ply: usize) -> Position {
    let fen = board.to_fen();
    Position {
        ply,
        key: crate::board::position_key(&fen),
        fen,
        turn: board.turn(),
        move_played: None,
        move_played_uci: None,
        legal_moves: board.legal_move_count(),
        is_checkmate: board.is_checkmate(),
        is_game_over: board.is_game_over(),
    }
}

/// The half-moves of an expanded game, in order.
pub fn played_moves(positions: &[Position]) -> Vec<PlayedMove> {
    positions
        .windows(2)
        .filter_map(|pair| {
            let (before, after) = (&pair[0], &pair[1]);
            Some(PlayedMove {
                ply: before.ply,
                san: before.move_played.clone()?,
                uci: before.move_played_uci.clone()?,
                from_fen: before.fen.clone(),
                to_fen: after.fen.clone(),
            })
        })
        .collect()
}
