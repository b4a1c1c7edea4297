// Agent Timeline - replay and inspection tool
//
// Feeds recorded event streams through the channel reducer and prints the
// resulting channel state.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use agent_timeline::models::history::ExecutionSummary;
use agent_timeline::models::settings::AppConfig;
use agent_timeline::services::reconstruct::reconstruct_execution;
use agent_timeline::services::transport::{LoggingTransport, NoopHistoryApi};
use agent_timeline::storage::ConfigService;
use agent_timeline::AppState;

#[derive(Debug, Parser)]
#[command(name = "agent-timeline", version, about = "Replay and inspect agent timelines")]
struct Args {
    /// Config file (defaults to ~/.agent-timeline/config.json)
    #[arg(long, global = true, env = "AGENT_TIMELINE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply a JSON-lines event log to a fresh channel and print its state
    Replay {
        /// File with one `{type, data}` frame per line
        #[arg(long)]
        events: PathBuf,
        /// Channel id to replay into
        #[arg(long, default_value = "replay")]
        channel: String,
    },
    /// Rebuild an execution from a persisted `agent_metadata` summary
    Reconstruct {
        #[arg(long)]
        summary: PathBuf,
    },
}

fn open_config(path: Option<&Path>) -> anyhow::Result<ConfigService> {
    let service = match path {
        Some(path) => ConfigService::open(path),
        None => ConfigService::new(),
    };
    service.context("failed to open config")
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_frames(path: &Path) -> anyhow::Result<Vec<Value>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut frames = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(frame) => frames.push(frame),
            Err(e) => tracing::warn!("[Replay] Skipping line {}: {}", index + 1, e),
        }
    }
    Ok(frames)
}

async fn replay(config: ConfigService, events: &Path, channel_id: &str) -> anyhow::Result<()> {
    let frames = read_frames(events)?;
    let total = frames.len();

    let state = AppState::new(config, Arc::new(LoggingTransport), Arc::new(NoopHistoryApi));
    let channels = state.channels();
    channels.open_channel(channel_id, channel_id, "Replay").await;
    let applied = channels
        .drive(channel_id, futures_util::stream::iter(frames))
        .await?;
    tracing::info!("[Replay] Applied {} of {} frames", applied, total);

    let channel = channels.snapshot(channel_id).await?;
    let status = channels.topic_status(channel_id).await?;
    println!("{}", serde_json::to_string_pretty(&channel)?);
    println!("status: {}", serde_json::to_string(&status)?);
    Ok(())
}

fn reconstruct(summary: &Path) -> anyhow::Result<()> {
    let text = fs::read_to_string(summary)
        .with_context(|| format!("failed to read {}", summary.display()))?;
    let summary: ExecutionSummary =
        serde_json::from_str(&text).context("invalid execution summary")?;
    let execution = reconstruct_execution(&summary, Utc::now());
    println!("{}", serde_json::to_string_pretty(&execution)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = open_config(args.config.as_deref())?;
    init_tracing(config.get_config());

    match args.command {
        Command::Replay { events, channel } => replay(config, &events, &channel).await,
        Command::Reconstruct { summary } => reconstruct(&summary),
    }
}
