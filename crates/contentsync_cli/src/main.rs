//! contentsync CLI
//!
//! Keeps a search index in sync with a relational film catalogue.
//!
//! # Commands
//!
//! - `run` - Sync continuously until interrupted
//! - `once` - Run a single sync cycle
//! - `checkpoints` - Show or reset stream watermarks

mod elastic;
mod error;
mod postgres;
mod redis_kv;
mod settings;

use clap::{Parser, Subcommand};
use contentsync_engine::{BulkHttpSink, Catalog, StopSignal, SyncEngine};
use elastic::ReqwestClient;
use error::{CliError, CliResult};
use postgres::PgConnector;
use settings::Settings;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Incremental sync from PostgreSQL into a search index.
#[derive(Parser)]
#[command(name = "contentsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync continuously until interrupted
    Run,

    /// Run a single sync cycle
    Once,

    /// Show stream watermarks
    Checkpoints {
        /// Forget the watermark of this stream so it is re-scanned
        #[arg(long, value_name = "STREAM")]
        reset: Option<String>,
    },
}

type Engine = SyncEngine<PgConnector, BulkHttpSink<ReqwestClient>>;

fn build_engine(settings: &Settings) -> CliResult<Engine> {
    let config = settings.sync_config()?;
    let connector = PgConnector::new(settings.pg_options())?;
    let client = ReqwestClient::new(Duration::from_secs(30))?;
    let sink = BulkHttpSink::new(settings.es_url(), client).with_retry(config.retry.clone());
    let checkpoints = settings.checkpoint_store()?;
    Ok(SyncEngine::new(config, Catalog::movies(), connector, sink, checkpoints))
}

fn run(settings: &Settings) -> CliResult<()> {
    let engine = build_engine(settings)?;
    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.stop()).map_err(|e| CliError::client("signal", e))?;

    engine.run(&stop)?;
    Ok(())
}

fn once(settings: &Settings) -> CliResult<()> {
    let engine = build_engine(settings)?;
    let report = engine.run_cycle()?;

    for stream in &report.streams {
        println!(
            "{:<12} changes={:<5} watermark={} {}",
            stream.stream,
            stream.changes,
            stream
                .watermark
                .as_ref()
                .map_or("-", |w| w.as_str()),
            if stream.advanced { "(advanced)" } else { "" }
        );
    }
    println!(
        "units={} widened={} documents={} in {:.2?}",
        report.units, report.widened, report.documents, report.duration
    );
    Ok(())
}

fn checkpoints(settings: &Settings, reset: Option<String>) -> CliResult<()> {
    let store = settings.checkpoint_store()?;

    if let Some(name) = reset {
        let catalog = Catalog::movies();
        let stream = catalog
            .stream(&name)
            .ok_or_else(|| CliError::Config(format!("unknown stream '{name}'")))?;
        if store.remove(&stream.checkpoint_key())? {
            info!(stream = %name, "checkpoint reset");
        } else {
            info!(stream = %name, "no checkpoint stored");
        }
    }

    let snapshot = serde_json::to_string_pretty(&store.snapshot())
        .map_err(|e| CliError::Config(e.to_string()))?;
    println!("{snapshot}");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&cli.settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run => run(&cli.settings)?,
        Commands::Once => once(&cli.settings)?,
        Commands::Checkpoints { reset } => checkpoints(&cli.settings, reset)?,
    }

    Ok(())
}
