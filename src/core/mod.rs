//! Core business logic module
//!
//! This module contains the storage engine and the balance mutation core:
//! - `database` - Handle to the in-process transactional store
//! - `scope` - Unit of work holding row locks and staged writes
//! - `wallet_store` - Wallet table with per-row locks
//! - `ledger_store` - Append-only ledger table
//! - `engine` - Top-ups and transfers
//! - `history` - Paginated ledger history
//! - `traits` - Inbound service interface

pub mod database;
pub mod engine;
pub mod history;
pub mod ledger_store;
pub mod scope;
pub mod traits;
pub mod wallet_store;

pub use database::Database;
pub use engine::BalanceEngine;
pub use history::{History, HistoryPage};
pub use ledger_store::LedgerStore;
pub use scope::Scope;
pub use traits::WalletService;
pub use wallet_store::WalletStore;
