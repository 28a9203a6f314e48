//! Command-line batch analysis of one PGN game.
//!
//! ```text
//! analyze-game <pgn-file|-> [--depth N] [--workers N]
//! ```
//!
//! Prints the same JSON document as the HTTP PGN endpoint.

use std::io::Read;

use anyhow::{bail, Context};
use tracing::info;

use analysis_worker::{AnalysisConfig, Depth, EngineBackend, Orchestrator};

const DEFAULT_DEPTH: i64 = 10;

struct CliArgs {
    input: String,
    depth: i64,
    workers: Option<usize>,
}

fn usage() -> &'static str {
    "usage: analyze-game <pgn-file|-> [--depth N] [--workers N]"
}

/// Parse CLI args
fn parse_args(args: &[String]) -> anyhow::Result<CliArgs> {
    let mut input = None;
    let mut depth = DEFAULT_DEPTH;
    let mut workers = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--depth" => {
                let value = args.get(i + 1).context(usage())?;
                depth = value.parse().with_context(|| format!("invalid depth '{value}'"))?;
                i += 2;
            }
            "--workers" => {
                let value = args.get(i + 1).context(usage())?;
                workers = Some(value.parse().with_context(|| format!("invalid worker count '{value}'"))?);
                i += 2;
            }
            "-h" | "--help" => bail!(usage()),
            other if input.is_none() => {
                input = Some(other.to_string());
                i += 1;
            }
            other => bail!("unexpected argument '{other}'\n{}", usage()),
        }
    }

    Ok(CliArgs {
        input: input.context(usage())?,
        depth,
        workers,
    })
}

fn read_input(path: &str) -> anyhow::Result<String> {
    if path == "-" {
        let mut pgn = String::new();
        std::io::stdin()
            .read_to_string(&mut pgn)
            .context("failed to read PGN from stdin")?;
        Ok(pgn)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (stderr, so stdout stays pure JSON)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args)?;
    let depth = Depth::new(cli.depth)?;

    let config = AnalysisConfig::from_env()?;
    info!(
        evaluator = ?config.evaluator,
        stockfish_path = %config.stockfish_path,
        max_workers = config.max_workers,
        "Analysis config loaded"
    );

    let pgn = read_input(&cli.input)?;
    let orchestrator = Orchestrator::new(EngineBackend::from_config(&config), config.orchestrator());
    let run = orchestrator.analyze_pgn(&pgn, depth, cli.workers).await?;

    println!("{}", serde_json::to_string_pretty(&run.report())?);
    Ok(())
}
