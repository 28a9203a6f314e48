//! Evaluator backed by an external script, one process per position.
//!
//! The script reads a single JSON document `{"fen": ..., "depth": ...}` on
//! stdin and must print exactly one JSON document on stdout:
//!
//! ```json
//! {"success": true, "best_move": "e2e4", "evaluation": {"type": "cp", "value": 31}, "depth": 12}
//! {"success": false, "error": "engine crashed"}
//! ```
//!
//! `evaluation` is from White's point of view and may also be a bare integer
//! number of centipawns. A non-zero exit status is a failure whatever stdout
//! contains.

use std::path::PathBuf;
use std::process::Stdio;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::EvaluatorFailure;
use crate::evaluator::{Depth, EvaluationResult, Evaluator, EvaluatorFactory, Perspective};
use crate::score::RawScore;

/// Characters of stderr kept in an `Exit` failure
const STDERR_TAIL: usize = 500;

#[derive(Debug, Clone)]
pub struct ScriptFactory {
    program: String,
    script: Option<PathBuf>,
    args: Vec<String>,
}

impl ScriptFactory {
    /// `program [script] [args...]`
    pub fn new(program: impl Into<String>, script: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            script,
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl EvaluatorFactory for ScriptFactory {
    type Evaluator = ScriptEvaluator;

    /// Nothing is spawned until the first evaluation, so a missing script
    /// file is reported here instead.
    async fn open(&self) -> Result<ScriptEvaluator, EvaluatorFailure> {
        if let Some(script) = &self.script {
            if tokio::fs::metadata(script).await.is_err() {
                return Err(EvaluatorFailure::Spawn(format!(
                    "evaluator script not found: {}",
                    script.display()
                )));
            }
        }
        Ok(ScriptEvaluator {
            factory: self.clone(),
        })
    }

    fn name(&self) -> &str {
        "script"
    }
}

pub struct ScriptEvaluator {
    factory: ScriptFactory,
}

impl ScriptEvaluator {
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.factory.program);
        if let Some(script) = &self.factory.script {
            cmd.arg(script);
        }
        cmd.args(&self.factory.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Evaluator for ScriptEvaluator {
    async fn evaluate(&mut self, fen: &str, depth: Depth) -> Result<EvaluationResult, EvaluatorFailure> {
        let mut child = self
            .command()
            .spawn()
            .map_err(|e| EvaluatorFailure::Spawn(format!("{}: {e}", self.factory.program)))?;

        let request = serde_json::json!({ "fen": fen, "depth": depth.get() });
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.to_string().as_bytes())
                .await
                .map_err(|e| EvaluatorFailure::Io(format!("write to script: {e}")))?;
            // Dropping stdin closes it so the script sees EOF
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| EvaluatorFailure::Io(format!("wait for script: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EvaluatorFailure::Exit {
                code: output.status.code(),
                stderr: tail(stderr.trim(), STDERR_TAIL),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(fen, stdout = %stdout.trim(), "script reply");
        parse_reply(fen, &stdout, depth)
    }

    async fn close(self) {}
}

#[derive(Debug, Deserialize)]
struct ScriptReply {
    success: bool,
    #[serde(default)]
    best_move: Option<String>,
    #[serde(default)]
    evaluation: Option<ScriptScore>,
    #[serde(default)]
    depth: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScriptScore {
    Tagged {
        #[serde(rename = "type")]
        kind: String,
        value: i32,
    },
    Plain(i32),
}

impl ScriptScore {
    fn to_raw(&self) -> Result<RawScore, EvaluatorFailure> {
        match self {
            ScriptScore::Plain(cp) => Ok(RawScore::Centipawns(*cp)),
            ScriptScore::Tagged { kind, value } => match kind.as_str() {
                "cp" => Ok(RawScore::Centipawns(*value)),
                "mate" => Ok(RawScore::Mate(*value)),
                other => Err(EvaluatorFailure::Parse(format!(
                    "unknown evaluation type '{other}'"
                ))),
            },
        }
    }
}

/// Turn one stdout document into a result.
fn parse_reply(fen: &str, stdout: &str, depth: Depth) -> Result<EvaluationResult, EvaluatorFailure> {
    let reply: ScriptReply = serde_json::from_str(stdout.trim())
        .map_err(|e| EvaluatorFailure::Parse(format!("{e}: {}", tail(stdout.trim(), 200))))?;

    if !reply.success {
        return Err(EvaluatorFailure::Engine(
            reply.error.unwrap_or_else(|| "script reported failure".into()),
        ));
    }

    let raw = reply
        .evaluation
        .as_ref()
        .ok_or_else(|| EvaluatorFailure::Parse("missing evaluation".into()))?
        .to_raw()?;

    EvaluationResult::from_engine(
        fen,
        reply.best_move.as_deref(),
        raw,
        Perspective::White,
        reply.depth.unwrap_or(depth.get() as u32),
    )
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max_chars)).collect()
}
