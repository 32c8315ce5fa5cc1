use std::io::Read;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use ridge_models::{Horizon, OutcomeUpdate, Snapshot, Ticker};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "ridge", about = "Retrieval-Informed Deliberation and Gated Entry")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/ridge.toml")]
    config: String,

    /// Pretty-print the output JSON
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide BUY/WAIT/PASS for a snapshot and record the analysis
    Analyze {
        /// Read Snapshot JSON from a file instead of stdin
        #[arg(short, long)]
        snapshot: Option<String>,
    },
    /// Show the tracked outcome of a signal
    Outcome {
        #[arg(long)]
        signal_id: Uuid,
    },
    /// Record the realized price of a signal at one horizon
    RecordOutcome {
        #[arg(long)]
        signal_id: Uuid,
        /// 30, 90 or 180
        #[arg(long)]
        horizon: u32,
        #[arg(long)]
        price: Decimal,
        #[arg(long)]
        return_pct: f64,
        /// RFC 3339 observation time; defaults to now
        #[arg(long)]
        observed_at: Option<DateTime<Utc>>,
    },
    /// List signal horizons that have elapsed without an observation
    Pending,
    /// Manage the watchlist
    Watch {
        #[command(subcommand)]
        action: WatchAction,
    },
}

#[derive(Subcommand, Debug)]
enum WatchAction {
    Add {
        symbol: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        sector: Option<String>,
    },
    Remove {
        symbol: String,
    },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only JSON (respects RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ridge::load_config(&cli.config)?;
    let engine = ridge::build_engine(config).context("Failed to build engine")?;

    match cli.command {
        Command::Analyze { snapshot } => {
            let json = match snapshot {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read snapshot: {path}"))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read from stdin")?;
                    buf
                }
            };
            let snapshot: Snapshot =
                serde_json::from_str(&json).context("Failed to parse Snapshot JSON")?;
            let ticker = engine
                .store()
                .get_ticker(&snapshot.symbol.to_uppercase())?
                .unwrap_or_else(|| Ticker::new(&snapshot.symbol));
            let decision = engine
                .analyze(&ticker, snapshot)
                .await
                .context("Analysis failed")?;
            print_json(&decision, cli.pretty)?;
        }
        Command::Outcome { signal_id } => match engine.get_outcome(signal_id)? {
            Some(outcome) => print_json(&outcome, cli.pretty)?,
            None => bail!("No outcome for signal {signal_id}"),
        },
        Command::RecordOutcome {
            signal_id,
            horizon,
            price,
            return_pct,
            observed_at,
        } => {
            let Some(horizon) = Horizon::from_days(horizon) else {
                bail!("Horizon must be 30, 90 or 180 days, got {horizon}");
            };
            let update = OutcomeUpdate {
                realized_price: price,
                realized_return_pct: return_pct,
                observed_at: observed_at.unwrap_or_else(Utc::now),
            };
            let outcome = engine.write_outcome(signal_id, horizon, &update)?;
            print_json(&outcome, cli.pretty)?;
        }
        Command::Pending => {
            let pending = engine.pending_outcomes(Utc::now())?;
            print_json(&pending, cli.pretty)?;
        }
        Command::Watch { action } => match action {
            WatchAction::Add {
                symbol,
                name,
                sector,
            } => {
                let mut ticker = Ticker::new(&symbol);
                ticker.name = name;
                ticker.sector = sector;
                engine.store().add_ticker(&ticker)?;
                print_json(&ticker, cli.pretty)?;
            }
            WatchAction::Remove { symbol } => {
                if !engine.store().remove_ticker(&symbol.to_uppercase())? {
                    bail!("{symbol} is not on the watchlist");
                }
            }
            WatchAction::List => {
                let tickers = engine.store().watchlist()?;
                print_json(&tickers, cli.pretty)?;
            }
        },
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}
