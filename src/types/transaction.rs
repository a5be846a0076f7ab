//! Ledger entry types
//!
//! Every successful balance mutation leaves exactly one ledger entry, written
//! in the same scope as the mutation it records.

use super::money::Money;
use super::wallet::WalletId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Ledger entry identifier
pub type TransactionId = i64;

/// Lifecycle of a ledger entry
///
/// `Success` and `Failed` are terminal: an entry in either state is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of movement an entry records, derived from which sides are set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Wallet to wallet
    Transfer,
    /// External deposit into a wallet (no sender)
    TopUp,
    /// Wallet to an external counterparty (no receiver)
    Withdrawal,
}

/// A committed (or staged) ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: TransactionId,

    /// Debited wallet, `None` for an external deposit
    pub sender_wallet_id: Option<WalletId>,

    /// Credited wallet, `None` for an external withdrawal
    pub receiver_wallet_id: Option<WalletId>,

    /// Always strictly positive
    pub amount: Money,

    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Classify the entry by its counterparties
    ///
    /// Returns `None` for a row with neither side set, which the ledger store
    /// refuses to insert.
    pub fn kind(&self) -> Option<EntryKind> {
        match (self.sender_wallet_id, self.receiver_wallet_id) {
            (Some(_), Some(_)) => Some(EntryKind::Transfer),
            (None, Some(_)) => Some(EntryKind::TopUp),
            (Some(_), None) => Some(EntryKind::Withdrawal),
            (None, None) => None,
        }
    }

    /// Whether the wallet appears on either side of the entry
    pub fn involves(&self, wallet_id: WalletId) -> bool {
        self.sender_wallet_id == Some(wallet_id) || self.receiver_wallet_id == Some(wallet_id)
    }
}

/// Values for a ledger row before the store assigns id and timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub sender_wallet_id: Option<WalletId>,
    pub receiver_wallet_id: Option<WalletId>,
    pub amount: Money,
    pub status: TransactionStatus,
}

impl NewLedgerEntry {
    /// A completed wallet-to-wallet transfer
    pub fn transfer(sender: WalletId, receiver: WalletId, amount: Money) -> Self {
        NewLedgerEntry {
            sender_wallet_id: Some(sender),
            receiver_wallet_id: Some(receiver),
            amount,
            status: TransactionStatus::Success,
        }
    }

    /// A completed external deposit into `receiver`
    pub fn top_up(receiver: WalletId, amount: Money) -> Self {
        NewLedgerEntry {
            sender_wallet_id: None,
            receiver_wallet_id: Some(receiver),
            amount,
            status: TransactionStatus::Success,
        }
    }
}
