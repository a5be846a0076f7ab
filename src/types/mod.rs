//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `money`: fixed-point monetary values
//! - `wallet`: wallet rows and identifiers
//! - `transaction`: ledger entries and their status
//! - `operation`: replayable engine requests
//! - `error`: error types for the engine and the store

pub mod error;
pub mod money;
pub mod operation;
pub mod transaction;
pub mod wallet;

pub use error::{LedgerError, StoreError};
pub use money::{Money, MINOR_UNIT_SCALE};
pub use operation::Operation;
pub use transaction::{EntryKind, LedgerEntry, NewLedgerEntry, TransactionId, TransactionStatus};
pub use wallet::{NewWallet, UserId, Wallet, WalletId};
