//! Wallet Ledger CLI
//!
//! Replays wallet operations from a CSV file through the balance engine.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- operations.csv > balances.csv
//! cargo run -- --strategy sync operations.csv > balances.csv
//! cargo run -- --strategy async --batch-size 2000 --max-concurrent 8 operations.csv > balances.csv
//! cargo run -- --config ledger.toml --ledger ledger.csv operations.csv > balances.csv
//! ```
//!
//! Final balances go to stdout as `user,balance`. Logs go to stderr and are
//! filtered with `RUST_LOG` (default `info`).
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (bad configuration, file not found, output failure, etc.)

use std::fs::File;
use std::io::BufWriter;
use std::process;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wallet_ledger::cli::{self, CliArgs, StrategyType};
use wallet_ledger::core::BalanceEngine;
use wallet_ledger::io::{write_ledger_csv, write_wallets_csv};
use wallet_ledger::strategy;

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = cli::parse_args();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: &CliArgs) -> Result<(), String> {
    let config = args
        .load_config()
        .map_err(|e| format!("Invalid configuration: {}", e))?;
    let engine = BalanceEngine::with_config(&config);

    let strategy = {
        let batch_config = if args.strategy == StrategyType::Async {
            Some(args.to_batch_config())
        } else {
            None
        };
        strategy::create_strategy(args.strategy, batch_config)
    };

    strategy.process(&args.input_file, &engine)?;

    let mut output = std::io::stdout().lock();
    write_wallets_csv(&engine.database().wallets().all(), &mut output)?;

    if let Some(path) = &args.ledger_output {
        let file = File::create(path)
            .map_err(|e| format!("Failed to create '{}': {}", path.display(), e))?;
        let mut writer = BufWriter::new(file);
        write_ledger_csv(&engine.database().ledger().all(), &mut writer)?;
        tracing::info!(path = %path.display(), "Ledger written");
    }

    Ok(())
}
