//! Balance mutation engine
//!
//! This module provides the `BalanceEngine` struct, the only component that
//! mutates wallet balances. Every mutation runs inside exactly one [`Scope`]:
//! the involved wallet rows are locked, invariants are checked against the
//! locked values, the new balances and the ledger entry are staged, and the
//! scope commits. Any error after the scope is opened drops it, which rolls
//! everything back.
//!
//! # Architecture
//!
//! ```text
//! BalanceEngine (Clone)
//!     ├── Database  (wallet table, ledger table, scopes)
//!     └── History   (read-only pagination over the ledger)
//! ```
//!
//! # Locking
//!
//! A transfer locks both wallets in ascending wallet id order, whatever the
//! direction of the transfer, so two opposite transfers between the same pair
//! of wallets cannot deadlock.

use super::database::Database;
use super::history::{History, HistoryPage};
use super::scope::Scope;
use crate::config::LedgerConfig;
use crate::types::{
    LedgerEntry, LedgerError, Money, NewLedgerEntry, NewWallet, StoreError, UserId, Wallet,
    WalletId,
};
use rust_decimal::Decimal;
use tokio::time::Instant;

/// Orchestrates top-ups and transfers over the wallet and ledger tables
///
/// Cloning is cheap and every clone drives the same tables, so the engine can
/// be handed to as many concurrent tasks as needed.
#[derive(Debug, Clone)]
pub struct BalanceEngine {
    database: Database,
    history: History,
}

impl BalanceEngine {
    pub fn new(database: Database, config: &LedgerConfig) -> Self {
        let history = History::new(database.clone(), config);
        Self { database, history }
    }

    /// Engine over a fresh in-process database
    pub fn with_config(config: &LedgerConfig) -> Self {
        Self::new(Database::new(config), config)
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Deposit `amount` into the wallet of `user_id`
    ///
    /// Creates the wallet with `balance = amount` when the user has none.
    /// Writes one top-up ledger entry. Returns the committed wallet.
    ///
    /// # Errors
    ///
    /// * `InvalidAmount` - amount not positive or more precise than cents
    /// * `ArithmeticOverflow` - the new balance does not fit
    /// * `LockTimeout` / `StorageFailure` - the store could not serve the request
    pub async fn top_up(&self, user_id: UserId, amount: Decimal) -> Result<Wallet, LedgerError> {
        self.top_up_until(user_id, amount, self.default_deadline())
            .await
    }

    /// [`top_up`](Self::top_up) bounded by a caller-supplied deadline
    pub async fn top_up_until(
        &self,
        user_id: UserId,
        amount: Decimal,
        deadline: Instant,
    ) -> Result<Wallet, LedgerError> {
        let amount = validate_amount(amount)?;
        let mut scope = self.database.begin_until(deadline)?;

        let (wallet, created) = self.lock_or_create(&mut scope, user_id, amount).await?;
        let wallet = if created {
            wallet
        } else {
            let balance = wallet
                .balance
                .checked_add(amount)
                .ok_or_else(|| LedgerError::arithmetic_overflow("top-up", user_id))?;
            self.database
                .wallets()
                .set_balance(&mut scope, wallet.id, balance)?
        };

        let entry = self
            .database
            .ledger()
            .append(&mut scope, NewLedgerEntry::top_up(wallet.id, amount))?;
        scope.commit()?;

        tracing::debug!(
            user = user_id,
            wallet = wallet.id,
            tx = entry.id,
            amount = %amount,
            balance = %wallet.balance,
            created,
            "Top-up committed"
        );
        Ok(wallet)
    }

    /// Move `amount` from the wallet of `sender` to the wallet of `receiver`
    ///
    /// Returns the committed ledger entry. Never creates a wallet.
    ///
    /// # Errors
    ///
    /// * `InvalidAmount` / `SelfTransfer` - rejected before any store access
    /// * `WalletNotFound` - either party has no wallet
    /// * `InsufficientBalance` - sender balance below `amount`
    /// * `ArithmeticOverflow` - receiver balance would not fit
    /// * `LockTimeout` / `StorageFailure` - the store could not serve the request
    pub async fn transfer(
        &self,
        sender: UserId,
        receiver: UserId,
        amount: Decimal,
    ) -> Result<LedgerEntry, LedgerError> {
        self.transfer_until(sender, receiver, amount, self.default_deadline())
            .await
    }

    /// [`transfer`](Self::transfer) bounded by a caller-supplied deadline
    pub async fn transfer_until(
        &self,
        sender: UserId,
        receiver: UserId,
        amount: Decimal,
        deadline: Instant,
    ) -> Result<LedgerEntry, LedgerError> {
        let amount = validate_amount(amount)?;
        if sender == receiver {
            return Err(LedgerError::self_transfer(sender));
        }

        let mut scope = self.database.begin_until(deadline)?;

        let sender_id = self.database.wallets().get_by_user_id(sender).map(|w| w.id);
        let receiver_id = self
            .database
            .wallets()
            .get_by_user_id(receiver)
            .map(|w| w.id);
        let locked = self
            .lock_in_order(&mut scope, [sender_id, receiver_id])
            .await?;

        // Checked only now that the rows are locked; the values cannot move.
        let sender_wallet = find_locked(&locked, sender_id)
            .ok_or_else(|| LedgerError::wallet_not_found(sender))?;
        if sender_wallet.balance < amount {
            return Err(LedgerError::insufficient_balance(
                sender,
                sender_wallet.balance,
                amount,
            ));
        }
        let receiver_wallet = find_locked(&locked, receiver_id)
            .ok_or_else(|| LedgerError::wallet_not_found(receiver))?;

        let sender_balance = sender_wallet
            .balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("transfer", sender))?;
        let receiver_balance = receiver_wallet
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("transfer", receiver))?;

        let wallets = self.database.wallets();
        wallets.set_balance(&mut scope, sender_wallet.id, sender_balance)?;
        wallets.set_balance(&mut scope, receiver_wallet.id, receiver_balance)?;

        let entry = self.database.ledger().append(
            &mut scope,
            NewLedgerEntry::transfer(sender_wallet.id, receiver_wallet.id, amount),
        )?;
        scope.commit()?;

        tracing::debug!(
            sender,
            receiver,
            tx = entry.id,
            amount = %amount,
            "Transfer committed"
        );
        Ok(entry)
    }

    /// Committed balance of `user_id`, without locking
    ///
    /// A user without a wallet reads as [`Wallet::unopened`].
    pub fn get_balance(&self, user_id: UserId) -> Result<Wallet, LedgerError> {
        self.database.ensure_open()?;
        Ok(self
            .database
            .wallets()
            .get_by_user_id(user_id)
            .unwrap_or_else(|| Wallet::unopened(user_id)))
    }

    /// Paginated ledger history of `user_id`, newest first
    pub fn get_history(
        &self,
        user_id: UserId,
        page: u32,
        limit: u32,
    ) -> Result<HistoryPage, LedgerError> {
        self.history.get_history(user_id, page, limit)
    }

    /// Create an empty wallet for `user_id`, as done at registration
    ///
    /// Returns the existing wallet unchanged if the user already has one.
    pub async fn open_wallet(&self, user_id: UserId) -> Result<Wallet, LedgerError> {
        self.open_wallet_until(user_id, self.default_deadline())
            .await
    }

    /// [`open_wallet`](Self::open_wallet) bounded by a caller-supplied deadline
    pub async fn open_wallet_until(
        &self,
        user_id: UserId,
        deadline: Instant,
    ) -> Result<Wallet, LedgerError> {
        let mut scope = self.database.begin_until(deadline)?;
        let (wallet, created) = self.lock_or_create(&mut scope, user_id, Money::ZERO).await?;
        scope.commit()?;

        if created {
            tracing::debug!(user = user_id, wallet = wallet.id, "Wallet opened");
        }
        Ok(wallet)
    }

    fn default_deadline(&self) -> Instant {
        Instant::now() + self.database.operation_timeout()
    }

    /// Lock the wallet of `user_id`, creating it with `initial` if absent
    ///
    /// Returns the wallet and whether it was created in this scope. When two
    /// scopes race to create the same wallet, the loser hits the unique index,
    /// then waits on the winner's row and reads what it committed.
    async fn lock_or_create(
        &self,
        scope: &mut Scope,
        user_id: UserId,
        initial: Money,
    ) -> Result<(Wallet, bool), LedgerError> {
        let wallets = self.database.wallets();
        loop {
            if let Some(wallet) = wallets.get_for_update(scope, user_id).await? {
                return Ok((wallet, false));
            }

            let new_wallet = NewWallet {
                user_id,
                balance: initial,
            };
            match wallets.create(scope, new_wallet).await {
                Ok(wallet) => return Ok((wallet, true)),
                Err(StoreError::DuplicateWallet { .. }) => {
                    tracing::debug!(user = user_id, "Wallet created concurrently, locking it");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Lock every known wallet id in ascending order
    async fn lock_in_order(
        &self,
        scope: &mut Scope,
        wallet_ids: [Option<WalletId>; 2],
    ) -> Result<Vec<Wallet>, LedgerError> {
        let mut ids: Vec<WalletId> = wallet_ids.into_iter().flatten().collect();
        ids.sort_unstable();
        ids.dedup();

        let mut locked = Vec::with_capacity(ids.len());
        for wallet_id in ids {
            if let Some(wallet) = self.database.wallets().lock_by_id(scope, wallet_id).await? {
                locked.push(wallet);
            }
        }
        Ok(locked)
    }
}

/// Validate a decimal amount and convert it to minor units
fn validate_amount(amount: Decimal) -> Result<Money, LedgerError> {
    let money = Money::from_decimal(amount)?;
    if !money.is_positive() {
        return Err(LedgerError::invalid_amount(amount));
    }
    Ok(money)
}

/// The locked wallet with `wallet_id`, if its row still existed once locked
fn find_locked(locked: &[Wallet], wallet_id: Option<WalletId>) -> Option<Wallet> {
    let wallet_id = wallet_id?;
    locked.iter().find(|wallet| wallet.id == wallet_id).cloned()
}
