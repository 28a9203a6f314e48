//! Rules-layer error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChessError {
    #[error("Invalid FEN: {0}")]
    InvalidFen(String),

    #[error("Illegal move at ply {ply}: {san}")]
    IllegalMove { ply: usize, san: String },

    #[error("No moves found in game")]
    EmptyGame,
}
