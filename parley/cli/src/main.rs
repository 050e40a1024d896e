//! Parley - Line-Oriented Dialog Host
//!
//! Reads one JSON turn per line, drives the orchestrator and prints one JSON
//! response per line. Logs go to stderr so stdout stays machine-readable.
//!
//! # Usage
//!
//! ```bash
//! # Turns from stdin, conversations saved under the platform data dir
//! parley < turns.jsonl
//!
//! # Seeded collaborators and a throwaway store
//! parley --fixtures demo.json --ephemeral --input turns.jsonl
//!
//! # Verbose logging
//! RUST_LOG=parley_core=debug parley < turns.jsonl
//! ```
//!
//! # Input
//!
//! ```text
//! {"conversation": "c1", "text": "book a meeting", "signals": {...}}
//! {"conversation": "c1", "reset": true}
//! ```

mod wire;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn};

use parley_core::services::Fixtures;
use parley_core::{
    load_config_from_path, ConfigOverrides, ConversationId, EngineConfig, FileStore, MemoryStore,
    Orchestrator, Services, StateStore,
};

use wire::{ResponseLine, TurnLine};

/// Parley - drive calendar conversations from JSON lines
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "PARLEY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for conversation records
    #[arg(short = 's', long, env = "PARLEY_STORE_DIR", value_name = "DIR")]
    store_dir: Option<PathBuf>,

    /// Keep conversations in memory only
    #[arg(long, conflicts_with = "store_dir")]
    ephemeral: bool,

    /// JSON fixtures seeding the in-memory calendar, directory and rooms
    #[arg(short = 'f', long, value_name = "FILE")]
    fixtures: Option<PathBuf>,

    /// Read turns from this file instead of stdin
    #[arg(short = 'i', long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Unrecognized answers before a prompt gives up
    #[arg(long, value_name = "N")]
    max_prompt_attempts: Option<u32>,

    /// Candidates per choice page
    #[arg(long, value_name = "N")]
    page_size: Option<usize>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(dir) = &self.store_dir {
            overrides = overrides.with_store_dir(dir.clone());
        }
        if let Some(attempts) = self.max_prompt_attempts {
            overrides = overrides.with_max_prompt_attempts(attempts);
        }
        if let Some(size) = self.page_size {
            overrides = overrides.with_page_size(size);
        }
        overrides
    }
}

/// Load the engine configuration: CLI > env > file > defaults
fn load_engine_config(args: &Args) -> Result<EngineConfig> {
    let mut config = load_config_from_path(args.config.clone())
        .context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;
    info!(source = ?config.source(), "Configuration loaded");
    Ok(config)
}

/// Read a fixtures file
fn load_fixtures(path: &Path) -> Result<Fixtures> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixtures: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse fixtures: {}", path.display()))
}

fn build_store(args: &Args, config: &EngineConfig) -> Result<Arc<dyn StateStore>> {
    if args.ephemeral {
        return Ok(Arc::new(MemoryStore::new()));
    }
    let dir = config
        .store_dir
        .clone()
        .or_else(FileStore::default_dir)
        .context("No data directory available; pass --store-dir or --ephemeral")?;
    info!(dir = %dir.display(), "Using file store");
    Ok(Arc::new(FileStore::new(dir)))
}

async fn open_input(path: Option<&Path>) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input: {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdin())),
    }
}

/// Handle one input line; `None` for a line that could not be parsed
async fn handle_line(orchestrator: &Orchestrator, line: &str) -> Result<Option<ResponseLine>> {
    let turn: TurnLine = match serde_json::from_str(line) {
        Ok(turn) => turn,
        Err(e) => {
            warn!(error = %e, "Skipping malformed input line");
            return Ok(None);
        }
    };
    let id = ConversationId::new(turn.conversation.clone());
    if turn.reset {
        orchestrator.on_reset(&id).await?;
        return Ok(Some(ResponseLine::reset(turn.conversation)));
    }
    let outcome = orchestrator.on_turn(&id, &turn.text, &turn.signals).await?;
    Ok(Some(ResponseLine::turn(turn.conversation, &outcome)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging on stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("parley_cli=info".parse()?)
                .add_directive("parley_core=info".parse()?),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config = load_engine_config(&args)?;
    let fixtures = match &args.fixtures {
        Some(path) => load_fixtures(path)?,
        None => Fixtures::default(),
    };
    let store = build_store(&args, &config)?;
    let orchestrator =
        Orchestrator::with_builtin_flows(store, Services::in_memory(&fixtures), config);

    let reader = open_input(args.input.as_deref()).await?;
    let mut lines = BufReader::new(reader).lines();
    let mut turns = 0usize;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = handle_line(&orchestrator, &line).await? {
            println!("{}", serde_json::to_string(&response)?);
            turns += 1;
        }
    }

    info!(turns, "Input exhausted");
    Ok(())
}
