//! Wallet Ledger Library
//! # Overview
//!
//! Each user owns one wallet with a non-negative balance. Funds enter a wallet
//! through top-ups and move between wallets through transfers. Every
//! successful mutation is recorded as exactly one ledger entry, written
//! atomically with the balance change it describes.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Money, Wallet, LedgerEntry, errors)
//! - [`config`] - Lock and pagination configuration
//! - [`core`] - Storage and business logic:
//!   - [`core::database`] - In-process transactional store
//!   - [`core::scope`] - Unit of work (row locks, staged writes, rollback on drop)
//!   - [`core::wallet_store`] / [`core::ledger_store`] - The two tables
//!   - [`core::engine`] - Top-ups and transfers
//!   - [`core::history`] - Paginated ledger history
//! - [`io`] - CSV replay input and balance/ledger output
//! - [`strategy`] - Sequential and concurrent replay pipelines
//! - [`cli`] - CLI arguments parsing
//!
//! # Concurrency
//!
//! Wallet rows are locked for the duration of a scope. A transfer locks both
//! wallets in ascending wallet id order, so opposite transfers between the same
//! pair of users never deadlock. Lock waits are bounded by a deadline; an
//! operation that times out, fails or is cancelled leaves no partial write.
//!
//! ```no_run
//! use rust_decimal::Decimal;
//! use wallet_ledger::{BalanceEngine, LedgerConfig};
//!
//! # async fn demo() -> Result<(), wallet_ledger::LedgerError> {
//! let engine = BalanceEngine::with_config(&LedgerConfig::default());
//! engine.top_up(1, Decimal::new(10_000, 2)).await?;
//! engine.open_wallet(2).await?;
//! let entry = engine.transfer(1, 2, Decimal::new(2_550, 2)).await?;
//! assert_eq!(entry.amount.to_string(), "25.50");
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod strategy;
pub mod types;

pub use config::{ConfigError, LedgerConfig};
pub use core::{BalanceEngine, Database, History, HistoryPage, Scope, WalletService};
pub use io::{write_ledger_csv, write_wallets_csv};
pub use types::{
    LedgerEntry, LedgerError, Money, Operation, StoreError, TransactionId, TransactionStatus,
    UserId, Wallet, WalletId,
};
