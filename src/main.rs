use ansledger::{config::PipelineConfig, fetch, pipeline};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use std::{path::PathBuf, sync::Arc};
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Quarterly health-plan expense ingestion, enrichment and summary"
)]
struct Args {
    /// YAML config file; ANSLEDGER_* variables override it.
    #[arg(short, long, env = "ANSLEDGER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Every stage in order (default).
    Run,
    /// Download and extract the quarterly archives.
    Fetch,
    /// Filter, normalize and aggregate the input files; validate the totals.
    Ingest,
    /// Join validated totals with the operator registry.
    Enrich,
    /// Group enriched rows into the final summary.
    Summarize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    let args = Args::parse();
    let cfg = Arc::new(PipelineConfig::load(args.config.as_deref())?);
    let command = args.command.unwrap_or(Command::Run);
    let client = Client::new();
    let start = Instant::now();
    info!("startup");

    // ─── 2) archives ─────────────────────────────────────────────────
    if matches!(command, Command::Run | Command::Fetch) {
        fetch::fetch_archives(&client, &cfg).await?;
    }

    // ─── 3) ingest + validate (blocking) ─────────────────────────────
    if matches!(command, Command::Run | Command::Ingest) {
        let cfg = Arc::clone(&cfg);
        tokio::task::spawn_blocking(move || pipeline::run_ingest(&cfg)).await??;
    }

    // ─── 4) registry + enrichment ────────────────────────────────────
    if matches!(command, Command::Run | Command::Enrich) {
        let registry_file = fetch::fetch_registry(&client, &cfg)
            .await
            .context("registry unavailable; enrichment aborted")?;
        let cfg = Arc::clone(&cfg);
        tokio::task::spawn_blocking(move || pipeline::run_enrich(&cfg, &registry_file)).await??;
    }

    // ─── 5) summary ──────────────────────────────────────────────────
    if matches!(command, Command::Run | Command::Summarize) {
        let cfg = Arc::clone(&cfg);
        tokio::task::spawn_blocking(move || pipeline::run_summarize(&cfg)).await??;
    }

    info!(elapsed = ?start.elapsed(), "all done");
    Ok(())
}
