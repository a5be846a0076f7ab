//! Wallet types
//!
//! A wallet is the single balance record a user owns. Wallet rows are only
//! ever mutated by the balance engine inside a transaction scope.

use super::money::Money;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// User identifier, resolved by the authentication layer
pub type UserId = i64;

/// Wallet identifier, assigned by the wallet store (starts at 1)
pub type WalletId = i64;

/// Snapshot of a wallet row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wallet {
    pub id: WalletId,

    /// Owner of the wallet (unique, one wallet per user)
    pub user_id: UserId,

    /// Current balance, never negative
    pub balance: Money,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Synthetic zero-balance wallet for a user who has not opened one yet
    ///
    /// Balance queries are permissive: a missing wallet reads as an empty one.
    /// The id is 0, which the store never assigns.
    pub fn unopened(user_id: UserId) -> Self {
        let now = Utc::now();
        Wallet {
            id: 0,
            user_id,
            balance: Money::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this snapshot refers to a stored row
    pub fn is_opened(&self) -> bool {
        self.id > 0
    }
}

/// Values for a wallet row that does not exist yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewWallet {
    pub user_id: UserId,
    pub balance: Money,
}
