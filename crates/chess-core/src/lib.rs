//! Chess rules facade, PGN extraction and game reconstruction.

pub mod board;
pub mod error;
pub mod pgn;
pub mod reconstruct;

pub use board::{position_key, validate_fen, AppliedMove, Board, Side, STANDARD_START_FEN};
pub use error::ChessError;
pub use pgn::{parse_pgn, PgnGame, PgnHeaders};
pub use reconstruct::{played_moves, PlayedMove, Position, Reconstructor};
