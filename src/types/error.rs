//! Error types for the wallet ledger
//!
//! Two layers of errors exist:
//!
//! - [`StoreError`]: failures of the storage primitives (locks, constraints,
//!   connectivity). The store never decides business validity.
//! - [`LedgerError`]: the taxonomy surfaced to callers of the engine and the
//!   history facade. Store failures are folded into it.
//!
//! # Error Categories
//!
//! - **Validation**: `InvalidAmount`, `SelfTransfer`. Raised before any store
//!   access, so no scope is ever opened for them.
//! - **Business**: `WalletNotFound`, `InsufficientBalance`, `ArithmeticOverflow`.
//!   Raised inside a scope, which is rolled back.
//! - **Retryable**: `LockTimeout`, `StorageFailure`. The engine never retries;
//!   the caller decides.

use super::money::Money;
use super::transaction::{TransactionId, TransactionStatus};
use super::wallet::{UserId, WalletId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by the balance engine and the history facade
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Amount is zero, negative, too precise or out of range
    #[error("Invalid amount '{amount}': must be positive with at most two decimal places")]
    InvalidAmount {
        /// The amount as submitted
        amount: String,
    },

    /// Sender and receiver are the same user
    #[error("User {user} cannot transfer to themselves")]
    SelfTransfer { user: UserId },

    /// The user has no wallet
    #[error("Wallet not found for user {user}")]
    WalletNotFound { user: UserId },

    /// Sender balance is below the requested amount
    #[error("Insufficient balance for user {user}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        user: UserId,
        balance: Money,
        requested: Money,
    },

    /// A wallet row lock was not obtained before the deadline
    #[error("Timed out waiting for lock on wallet {wallet}")]
    LockTimeout { wallet: WalletId },

    /// The underlying store failed (closed, constraint violation, ...)
    #[error("Storage failure: {message}")]
    StorageFailure { message: String },

    /// Applying the amount would overflow the balance representation
    #[error("Arithmetic overflow in {operation} for user {user}")]
    ArithmeticOverflow { operation: String, user: UserId },
}

impl LedgerError {
    pub fn invalid_amount(amount: Decimal) -> Self {
        LedgerError::InvalidAmount {
            amount: amount.to_string(),
        }
    }

    pub fn self_transfer(user: UserId) -> Self {
        LedgerError::SelfTransfer { user }
    }

    pub fn wallet_not_found(user: UserId) -> Self {
        LedgerError::WalletNotFound { user }
    }

    pub fn insufficient_balance(user: UserId, balance: Money, requested: Money) -> Self {
        LedgerError::InsufficientBalance {
            user,
            balance,
            requested,
        }
    }

    pub fn arithmetic_overflow(operation: &str, user: UserId) -> Self {
        LedgerError::ArithmeticOverflow {
            operation: operation.to_string(),
            user,
        }
    }

    /// Whether the same request may succeed if submitted again unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::LockTimeout { .. } | LedgerError::StorageFailure { .. }
        )
    }
}

/// Errors raised by the storage primitives
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The database has been closed
    #[error("database is closed")]
    Closed,

    /// Row lock wait exceeded the lock wait timeout or the scope deadline
    #[error("lock wait timeout on wallet {wallet}")]
    LockTimeout { wallet: WalletId },

    /// Unique index on `wallets.user_id`
    #[error("user {user} already has a wallet")]
    DuplicateWallet { user: UserId },

    /// A write was attempted on a row the scope does not hold a lock on
    #[error("wallet {wallet} is not locked by this scope")]
    NotLocked { wallet: WalletId },

    /// The locked row no longer exists (deleted or never committed)
    #[error("wallet {wallet} does not exist")]
    WalletMissing { wallet: WalletId },

    /// Check constraint `balance >= 0`
    #[error("wallet {wallet} balance cannot become negative")]
    NegativeBalance { wallet: WalletId },

    /// A ledger row violated one of its constraints
    #[error("constraint violation: {message}")]
    Constraint { message: String },

    #[error("ledger entry {tx} not found")]
    EntryNotFound { tx: TransactionId },

    /// Terminal ledger entries cannot change status
    #[error("ledger entry {tx} is already {status}")]
    ImmutableEntry {
        tx: TransactionId,
        status: TransactionStatus,
    },

    /// The scope was opened on a different database
    #[error("scope belongs to another database")]
    ForeignScope,
}

impl StoreError {
    pub fn constraint(message: impl Into<String>) -> Self {
        StoreError::Constraint {
            message: message.into(),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::LockTimeout { wallet } => LedgerError::LockTimeout { wallet },
            other => LedgerError::StorageFailure {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::invalid_amount(
        LedgerError::InvalidAmount { amount: "-5".to_string() },
        "Invalid amount '-5': must be positive with at most two decimal places"
    )]
    #[case::self_transfer(
        LedgerError::SelfTransfer { user: 7 },
        "User 7 cannot transfer to themselves"
    )]
    #[case::wallet_not_found(
        LedgerError::WalletNotFound { user: 42 },
        "Wallet not found for user 42"
    )]
    #[case::insufficient_balance(
        LedgerError::InsufficientBalance {
            user: 1,
            balance: Money::from_minor_units(1_000),
            requested: Money::from_minor_units(5_000),
        },
        "Insufficient balance for user 1: balance 10.00, requested 50.00"
    )]
    #[case::lock_timeout(
        LedgerError::LockTimeout { wallet: 3 },
        "Timed out waiting for lock on wallet 3"
    )]
    #[case::storage_failure(
        LedgerError::StorageFailure { message: "database is closed".to_string() },
        "Storage failure: database is closed"
    )]
    #[case::arithmetic_overflow(
        LedgerError::ArithmeticOverflow { operation: "top-up".to_string(), user: 9 },
        "Arithmetic overflow in top-up for user 9"
    )]
    fn test_error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::lock_timeout(
        StoreError::LockTimeout { wallet: 4 },
        LedgerError::LockTimeout { wallet: 4 }
    )]
    #[case::closed(
        StoreError::Closed,
        LedgerError::StorageFailure { message: "database is closed".to_string() }
    )]
    #[case::duplicate(
        StoreError::DuplicateWallet { user: 2 },
        LedgerError::StorageFailure { message: "user 2 already has a wallet".to_string() }
    )]
    fn test_store_error_conversion(#[case] store: StoreError, #[case] expected: LedgerError) {
        assert_eq!(LedgerError::from(store), expected);
    }

    #[rstest]
    #[case(LedgerError::invalid_amount(Decimal::ZERO), false)]
    #[case(LedgerError::self_transfer(1), false)]
    #[case(LedgerError::wallet_not_found(1), false)]
    #[case(LedgerError::insufficient_balance(1, Money::ZERO, Money::from_minor_units(1)), false)]
    #[case(LedgerError::arithmetic_overflow("transfer", 1), false)]
    #[case(LedgerError::LockTimeout { wallet: 1 }, true)]
    #[case(LedgerError::StorageFailure { message: "down".to_string() }, true)]
    fn test_retryable_classification(#[case] error: LedgerError, #[case] retryable: bool) {
        assert_eq!(error.is_retryable(), retryable);
    }
}
