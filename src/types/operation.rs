//! Logical operations submitted to the balance engine
//!
//! These are the replayable requests read from operation files. Amounts stay
//! as decimals here; the engine validates and converts them.

use super::wallet::UserId;
use rust_decimal::Decimal;

/// A single balance-mutating request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// External deposit into the user's wallet
    TopUp { user: UserId, amount: Decimal },

    /// Move funds from `sender` to `receiver`
    Transfer {
        sender: UserId,
        receiver: UserId,
        amount: Decimal,
    },
}

impl Operation {
    /// The user that initiated the operation
    pub fn initiator(&self) -> UserId {
        match self {
            Operation::TopUp { user, .. } => *user,
            Operation::Transfer { sender, .. } => *sender,
        }
    }

    /// The other user touched by the operation, if any
    pub fn counterparty(&self) -> Option<UserId> {
        match self {
            Operation::TopUp { .. } => None,
            Operation::Transfer { receiver, .. } => Some(*receiver),
        }
    }

    pub fn amount(&self) -> Decimal {
        match self {
            Operation::TopUp { amount, .. } | Operation::Transfer { amount, .. } => *amount,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::TopUp { .. } => "topup",
            Operation::Transfer { .. } => "transfer",
        }
    }
}
