//! Inbound interface of the wallet ledger
//!
//! Request handlers and replay pipelines talk to the ledger through
//! `WalletService`, so they can be driven by any implementation.

use std::future::Future;

use rust_decimal::Decimal;

use super::engine::BalanceEngine;
use super::history::HistoryPage;
use crate::types::{LedgerEntry, LedgerError, UserId, Wallet};

/// Operations invoked once a caller identity has been resolved
///
/// Every returned future is `Send`, so callers can spawn them on a
/// multi-threaded runtime.
pub trait WalletService: Send + Sync {
    /// Deposit into the user's wallet, creating it if needed
    fn top_up(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> impl Future<Output = Result<Wallet, LedgerError>> + Send;

    /// Move funds between two users' wallets
    fn transfer(
        &self,
        sender: UserId,
        receiver: UserId,
        amount: Decimal,
    ) -> impl Future<Output = Result<LedgerEntry, LedgerError>> + Send;

    /// One page of the user's ledger history, newest first
    fn get_history(
        &self,
        user_id: UserId,
        page: u32,
        limit: u32,
    ) -> impl Future<Output = Result<HistoryPage, LedgerError>> + Send;

    /// The user's committed balance; a missing wallet reads as zero
    fn get_balance(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Wallet, LedgerError>> + Send;
}

impl WalletService for BalanceEngine {
    fn top_up(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> impl Future<Output = Result<Wallet, LedgerError>> + Send {
        BalanceEngine::top_up(self, user_id, amount)
    }

    fn transfer(
        &self,
        sender: UserId,
        receiver: UserId,
        amount: Decimal,
    ) -> impl Future<Output = Result<LedgerEntry, LedgerError>> + Send {
        BalanceEngine::transfer(self, sender, receiver, amount)
    }

    fn get_history(
        &self,
        user_id: UserId,
        page: u32,
        limit: u32,
    ) -> impl Future<Output = Result<HistoryPage, LedgerError>> + Send {
        std::future::ready(BalanceEngine::get_history(self, user_id, page, limit))
    }

    fn get_balance(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Wallet, LedgerError>> + Send {
        std::future::ready(BalanceEngine::get_balance(self, user_id))
    }
}
