//! Thin CLI wrapper around the transaction dependency engine library.
//!
//! This binary does not speak to a real chain source or executor — those
//! are external collaborators implemented elsewhere. It exists to open the
//! store, run trust/ban/unindex management commands against it, and
//! otherwise idle so the engine's state (and any wired webhook/broadcast
//! sink) stays live for inspection.

use std::error::Error;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use txdag::config::load_config;
use txdag::engine::Engine;
use txdag::events::{BroadcastEventSink, EventSink, NoopEventSink, WebhookEventSink};
use txdag::types::Txid;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(long)]
    config: Option<String>,

    /// Override the sqlite database file path.
    #[arg(long)]
    db_file: Option<String>,

    /// Run for a fixed duration in seconds, then exit (overrides config).
    #[arg(long)]
    duration: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mark a transaction (and its untrusted code-bearing ancestors) as trusted.
    Trust { txid: String },
    /// Revoke trust for a transaction, unindexing its descendants.
    Untrust { txid: String },
    /// Ban a transaction, unindexing its descendants.
    Ban { txid: String },
    /// Remove a ban.
    Unban { txid: String },
    /// Force a transaction and its persisted downstream back into the unexecuted graph.
    Unindex { txid: String },
    /// Delete a transaction and its downstream, recursively.
    Delete { txid: String },
    /// Print the current chain tip and readiness counters.
    Status,
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| Box::<dyn Error + Send + Sync>::from(format!("failed to create runtime: {e}")))?;

    let result = runtime.block_on(async_main());
    runtime.shutdown_timeout(std::time::Duration::from_secs(2));
    result
}

async fn async_main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = Args::parse();
    txdag::logging::init_logging();

    let mut config = load_config(args.config.as_deref());
    if let Some(db_file) = &args.db_file {
        config.store.db_file = db_file.clone();
    }

    let sink: Box<dyn EventSink> = match &config.webhook.url {
        Some(url) => Box::new(WebhookEventSink::new(url.clone(), tokio::runtime::Handle::current())),
        None => Box::new(NoopEventSink),
    };

    let mut engine = Engine::open(&config.store.db_file, &config, sink)?;
    info!(db_file = %config.store.db_file, "txdag engine opened");

    if let Some(command) = args.command {
        run_command(&mut engine, command)?;
        return Ok(());
    }

    // No subcommand: idle with a broadcast sink available for in-process
    // observers, exiting after `duration` (or the configured default) or
    // on Ctrl+C.
    let _broadcast = BroadcastEventSink::new(256);
    let duration = args.duration.or(config.development.default_duration_secs);
    match duration {
        Some(secs) => {
            info!(secs, "running for a fixed duration");
            tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
        }
        None => {
            info!("running indefinitely; press Ctrl+C to exit");
            tokio::signal::ctrl_c().await?;
        }
    }

    info!("shutdown complete");
    Ok(())
}

fn run_command(engine: &mut Engine, command: Command) -> Result<(), Box<dyn Error + Send + Sync>> {
    match command {
        Command::Trust { txid } => engine.trust(&parse_txid(&txid)?)?,
        Command::Untrust { txid } => engine.untrust(&parse_txid(&txid)?)?,
        Command::Ban { txid } => engine.ban(&parse_txid(&txid)?)?,
        Command::Unban { txid } => engine.unban(&parse_txid(&txid)?)?,
        Command::Unindex { txid } => engine.unindex(&parse_txid(&txid)?)?,
        Command::Delete { txid } => engine.delete_transaction(&parse_txid(&txid)?)?,
        Command::Status => {
            let height = engine.get_height()?;
            let hash = engine.get_hash()?;
            info!(?height, ?hash, queued = engine.num_queued_for_execution(), "engine status");
        }
    }
    Ok(())
}

fn parse_txid(raw: &str) -> Result<Txid, Box<dyn Error + Send + Sync>> {
    raw.parse::<Txid>().map_err(|e| {
        error!(txid = raw, error = %e, "invalid txid");
        Box::<dyn Error + Send + Sync>::from(e.to_string())
    })
}
