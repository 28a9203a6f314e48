//! PGN parsing utilities (lightweight regex-based parser).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::board::strip_annotations;
use crate::error::ChessError;

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).expect("header regex"));
static TAG_PAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("tag regex"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]*\}|;[^\n]*").expect("comment regex"));
// Innermost variation only; applied until nothing is left to strip
static VARIATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^()]*\)").expect("variation regex"));
static NAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\d+").expect("nag regex"));
static MOVE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.+").expect("move number regex"));

const RESULT_TOKENS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgnHeaders {
    pub white: Option<String>,
    pub black: Option<String>,
    pub result: Option<String>,
    pub event: Option<String>,
    /// `[FEN]` header when the game does not start from the initial position
    pub start_fen: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgnGame {
    pub headers: PgnHeaders,
    /// SAN tokens exactly as written, minus annotation glyphs
    pub moves: Vec<String>,
}

/// Parse the first game of a PGN string. Later games are ignored.
pub fn parse_pgn(pgn: &str) -> Result<PgnGame, ChessError> {
    let pgn = first_game(pgn);
    let mut headers = PgnHeaders::default();
    let mut setup = None;
    let mut fen = None;

    for cap in HEADER_RE.captures_iter(pgn) {
        let value = cap[2].to_string();
        match &cap[1] {
            "White" => headers.white = Some(value),
            "Black" => headers.black = Some(value),
            "Result" => headers.result = Some(value),
            "Event" => headers.event = Some(value),
            "SetUp" => setup = Some(value),
            "FEN" => fen = Some(value),
            _ => {}
        }
    }

    // A FEN header counts unless SetUp explicitly says otherwise
    if setup.as_deref() != Some("0") {
        headers.start_fen = fen.filter(|f| !f.trim().is_empty());
    }

    let moves = extract_moves(pgn);
    if moves.is_empty() {
        return Err(ChessError::EmptyGame);
    }

    Ok(PgnGame { headers, moves })
}

/// The text of the first game: its tag pairs plus movetext, up to the next
/// tag-pair section.
fn first_game(pgn: &str) -> &str {
    let mut in_movetext = false;
    let mut offset = 0;
    for line in pgn.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') {
            if in_movetext {
                return &pgn[..offset];
            }
        } else if !trimmed.is_empty() {
            in_movetext = true;
        }
        offset += line.len();
    }
    pgn
}

/// Extract SAN tokens from PGN text (after removing headers, comments, variations).
///
/// Tokens are not checked against the SAN grammar here: a malformed token is
/// kept so that replaying the game reports it with its ply.
fn extract_moves(pgn: &str) -> Vec<String> {
    let no_headers = TAG_PAIR_RE.replace_all(pgn, " ");
    let mut text = COMMENT_RE.replace_all(&no_headers, " ").into_owned();

    loop {
        let stripped = VARIATION_RE.replace_all(&text, " ").into_owned();
        if stripped == text {
            break;
        }
        text = stripped;
    }

    let text = NAG_RE.replace_all(&text, " ");

    let mut moves = Vec::new();
    for token in text.split_whitespace() {
        let token = MOVE_NUMBER_RE.replace(token, "");
        let token = strip_annotations(&token);
        // The result token ends the game
        if RESULT_TOKENS.contains(&token) {
            break;
        }
        if !token.is_empty() {
            moves.push(token.to_string());
        }
    }
    moves
}
