//! Stockfish engine wrapper using UCI protocol (async I/O)

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

use crate::error::EvaluatorFailure;
use crate::evaluator::{Depth, EvaluationResult, Evaluator, EvaluatorFactory, Perspective};
use crate::score::RawScore;

/// Lines tolerated while waiting for a handshake reply
const MAX_UCI_LINES: usize = 1000;

/// Engine options sent once per session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub threads: u32,
    pub hash_mb: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            hash_mb: 128,
        }
    }
}

/// Outcome of one `go depth N` search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchReport {
    /// Score relative to the side to move
    pub score: RawScore,
    /// `None` for `bestmove (none)`
    pub best_move: Option<String>,
    pub depth: u32,
    pub pv: Vec<String>,
}

/// Accumulates `info` lines until `bestmove` arrives
#[derive(Debug, Default)]
struct SearchState {
    cp: Option<i32>,
    mate: Option<i32>,
    depth: u32,
    pv: Vec<String>,
}

impl SearchState {
    fn absorb(&mut self, line: &str) {
        // Bound scores are partial results from an aspiration window
        if line.contains("upperbound") || line.contains("lowerbound") {
            return;
        }
        if !line.contains(" score ") {
            return;
        }
        if let Some(cp) = parse_cp(line) {
            self.cp = Some(cp);
            self.mate = None;
        }
        if let Some(mate) = parse_mate(line) {
            self.mate = Some(mate);
            self.cp = None;
        }
        if let Some(depth) = parse_depth(line) {
            self.depth = depth;
        }
        let pv = parse_pv(line);
        if !pv.is_empty() {
            self.pv = pv;
        }
    }

    fn finish(self, bestmove_line: &str) -> Result<SearchReport, EvaluatorFailure> {
        let score = RawScore::from_parts(self.cp, self.mate).ok_or_else(|| {
            EvaluatorFailure::Parse(format!("no score before '{bestmove_line}'"))
        })?;
        if !score.in_range() {
            return Err(EvaluatorFailure::Parse(format!("score out of range: {score:?}")));
        }
        let best_move = bestmove_line
            .split_whitespace()
            .nth(1)
            .filter(|m| *m != "(none)")
            .map(str::to_string);
        Ok(SearchReport {
            score,
            best_move,
            depth: self.depth,
            pv: self.pv,
        })
    }
}

/// A persistent Stockfish process owned by one worker
pub struct UciSession {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl UciSession {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn spawn(path: &str, options: &EngineOptions) -> Result<Self, EvaluatorFailure> {
        let mut process = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EvaluatorFailure::Spawn(format!("{path}: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EvaluatorFailure::Spawn("engine stdin unavailable".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| EvaluatorFailure::Spawn("engine stdout unavailable".into()))?;

        let mut session = Self {
            process,
            stdin,
            stdout: BufReader::new(stdout),
        };

        session.send("uci").await?;
        session.wait_for("uciok").await?;

        session
            .send(&format!("setoption name Threads value {}", options.threads))
            .await?;
        session
            .send(&format!("setoption name Hash value {}", options.hash_mb))
            .await?;
        session.send("isready").await?;
        session.wait_for("readyok").await?;

        Ok(session)
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> Result<(), EvaluatorFailure> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| EvaluatorFailure::Io(format!("write to engine: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| EvaluatorFailure::Io(format!("flush engine stdin: {e}")))?;
        Ok(())
    }

    /// Read one line; EOF means the engine died
    async fn read_line(&mut self, line: &mut String) -> Result<(), EvaluatorFailure> {
        line.clear();
        let read = self
            .stdout
            .read_line(line)
            .await
            .map_err(|e| EvaluatorFailure::Io(format!("read from engine: {e}")))?;
        if read == 0 {
            let code = self.process.try_wait().ok().flatten().and_then(|s| s.code());
            return Err(EvaluatorFailure::Exit {
                code,
                stderr: "engine closed its output".into(),
            });
        }
        Ok(())
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str) -> Result<(), EvaluatorFailure> {
        let mut line = String::new();
        for _ in 0..MAX_UCI_LINES {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();
            debug!(line = trimmed, "SF >");
            if trimmed == expected {
                return Ok(());
            }
        }
        Err(EvaluatorFailure::Parse(format!(
            "no '{expected}' within {MAX_UCI_LINES} lines"
        )))
    }

    /// Search a position to a fixed depth
    pub async fn search(&mut self, fen: &str, depth: Depth) -> Result<SearchReport, EvaluatorFailure> {
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go depth {depth}")).await?;

        let mut state = SearchState::default();
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") {
                state.absorb(trimmed);
            } else if trimmed.starts_with("bestmove") {
                return state.finish(trimmed);
            }
        }
    }

    /// Send quit command and wait for process to exit
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Drop for UciSession {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

impl Evaluator for UciSession {
    async fn evaluate(&mut self, fen: &str, depth: Depth) -> Result<EvaluationResult, EvaluatorFailure> {
        let report = self.search(fen, depth).await?;
        let result = EvaluationResult::from_engine(
            fen,
            report.best_move.as_deref(),
            report.score,
            Perspective::SideToMove,
            report.depth,
        )?;
        Ok(result.with_pv(report.pv))
    }

    async fn close(mut self) {
        self.quit().await;
    }
}

/// Opens [`UciSession`]s against one engine binary
#[derive(Debug, Clone)]
pub struct UciFactory {
    path: String,
    options: EngineOptions,
}

impl UciFactory {
    pub fn new(path: impl Into<String>, options: EngineOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }
}

impl EvaluatorFactory for UciFactory {
    type Evaluator = UciSession;

    async fn open(&self) -> Result<UciSession, EvaluatorFailure> {
        let session = UciSession::spawn(&self.path, &self.options).await?;
        info!(path = %self.path, threads = self.options.threads, "Stockfish session ready");
        Ok(session)
    }

    fn name(&self) -> &str {
        "stockfish"
    }
}

/// Value following `key` in a whitespace-separated info line
fn parse_field<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
    let mut parts = line.split_whitespace();
    while let Some(part) = parts.next() {
        if part == key {
            return parts.next()?.parse().ok();
        }
    }
    None
}

/// Parse centipawn score from info line
fn parse_cp(line: &str) -> Option<i32> {
    parse_field(line, "cp")
}

/// Parse mate score from info line
fn parse_mate(line: &str) -> Option<i32> {
    parse_field(line, "mate")
}

fn parse_depth(line: &str) -> Option<u32> {
    parse_field(line, "depth")
}

/// Parse PV moves from info line
fn parse_pv(line: &str) -> Vec<String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mut in_pv = false;
    let mut moves = Vec::new();

    for part in parts {
        if part == "pv" {
            in_pv = true;
            continue;
        }
        if in_pv {
            // PV ends at next keyword or end of line
            if part.starts_with("bmc") || part == "string" {
                break;
            }
            moves.push(part.to_string());
        }
    }

    moves
}
