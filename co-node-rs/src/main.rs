//! CO Node - charging-option marketplace ledger
//!
//! Opens a ledger (durable or in-memory) and submits contract invocations:
//! - `invoke` - one invocation, payload to stdout
//! - `batch` - one invocation per line, submitted concurrently
//! - `repl` - invocations read from stdin

mod batch;

use clap::{Parser, Subcommand};
use co_core::{ChargingOptionContract, Ledger, MarketConfig, Outcome, PricingMode, StorageConfig};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Charging-option marketplace node
#[derive(Parser, Debug)]
#[command(name = "co-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Ledger data directory (WAL and snapshots)
    #[arg(short, long, default_value = "./co-data", global = true)]
    data_dir: PathBuf,

    /// Keep the ledger in memory only
    #[arg(long, global = true)]
    in_memory: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Pricing arithmetic (integer, fixed-point)
    #[arg(long, default_value = "integer", global = true)]
    pricing: PricingMode,

    /// Number of charging stations
    #[arg(long, default_value = "9", global = true)]
    stations: u32,

    /// Number of time slots per station
    #[arg(long, default_value = "10", global = true)]
    horizon: u32,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a single invocation
    Invoke {
        /// Operation name (initLedger, buy, confirm, list, delist, queryCO, queryList, queryPrice)
        function: String,

        /// Positional arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Submit invocations from a file, one per line
    Batch {
        /// Path to the batch file
        file: PathBuf,

        /// Resubmissions allowed per conflicting invocation
        #[arg(long, default_value = "16")]
        max_retries: u32,
    },

    /// Read invocations from stdin
    Repl,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging; stdout carries payloads only
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = MarketConfig::default()
        .with_stations(args.stations)
        .with_horizon(args.horizon)
        .with_pricing_mode(args.pricing);
    let contract = Arc::new(ChargingOptionContract::new(config)?);

    let ledger = if args.in_memory {
        info!("CO node starting with in-memory ledger");
        Ledger::in_memory()
    } else {
        info!("CO node starting with ledger at {}", args.data_dir.display());
        Ledger::open(StorageConfig::at(&args.data_dir))?
    };
    let ledger = Arc::new(ledger);
    info!("Ledger at height {}", ledger.height());

    match args.command {
        Command::Invoke { function, args } => {
            let outcome = contract.submit(&ledger, &function, &args)?;
            print_outcome(&outcome)?;
        }

        Command::Batch { file, max_retries } => {
            let input = tokio::fs::read_to_string(&file).await?;
            let invocations = batch::parse_batch(&input);
            info!("Batch: {} invocations from {}", invocations.len(), file.display());

            let results = batch::run_batch(Arc::clone(&contract), Arc::clone(&ledger), invocations, max_retries).await;

            let mut failed = 0;
            for r in &results {
                match &r.result {
                    Ok(outcome) => {
                        println!(
                            "[{}] {}: ok (height {}, attempts {})",
                            r.invocation.line, r.invocation.function, outcome.receipt.height, r.attempts
                        );
                        print_outcome(outcome)?;
                    }
                    Err(e) => {
                        failed += 1;
                        println!(
                            "[{}] {}: error: {} (attempts {})",
                            r.invocation.line, r.invocation.function, e, r.attempts
                        );
                    }
                }
            }
            info!(
                "Batch: {} succeeded, {} failed, ledger at height {}",
                results.len() - failed,
                failed,
                ledger.height()
            );
        }

        Command::Repl => repl(&contract, &ledger).await?,
    }

    Ok(())
}

/// Interactive loop over stdin
async fn repl(contract: &ChargingOptionContract, ledger: &Ledger) -> Result<(), Box<dyn std::error::Error>> {
    println!("\nCommands:");
    println!("  <function> [args...]  - Submit an invocation");
    println!("  height                - Show ledger height");
    println!("  quit                  - Exit\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let Some(invocation) = batch::parse_line(0, &line) else { continue };

                match invocation.function.as_str() {
                    "quit" | "exit" => break,
                    "height" => println!("height {}", ledger.height()),
                    _ => match contract.submit(ledger, &invocation.function, &invocation.args) {
                        Ok(outcome) => print_outcome(&outcome)?,
                        Err(e) => println!("error: {}", e),
                    },
                }
            }

            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted");
                break;
            }
        }
    }

    info!("CO node stopped at height {}", ledger.height());
    Ok(())
}

/// Write a payload to stdout, newline-terminated
fn print_outcome(outcome: &Outcome) -> std::io::Result<()> {
    if outcome.payload.is_empty() {
        return Ok(());
    }

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&outcome.payload)?;
    if !outcome.payload.ends_with(b"\n") {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()
}
