//! Wallet table with per-row exclusive locks
//!
//! Rows live in a `DashMap` keyed by wallet id, with a unique secondary index
//! on `user_id`. Each row carries:
//!
//! - an async mutex, the exclusive row lock a [`Scope`] holds until it ends,
//! - the last committed image, which is all that lock-free readers ever see.
//!
//! Lock-free reads (`get_by_user_id`, `get_by_id`, `all`) never wait on a row
//! lock and never observe writes staged by an open scope. Reads spanning
//! several rows (`all`, `len`) also hold the shared commit gate, so they never
//! see one wallet of a transfer updated and the other not.

use super::scope::Scope;
use crate::types::{Money, NewWallet, StoreError, UserId, Wallet, WalletId};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Visible state of a row
#[derive(Debug, Clone)]
enum RowImage {
    /// Created by a scope that has not committed yet
    Uncommitted,
    Live(Wallet),
    /// Deleted, or created by a scope that rolled back
    Removed,
}

/// A single wallet row
#[derive(Debug)]
pub struct WalletRow {
    pub(crate) id: WalletId,
    pub(crate) user_id: UserId,
    pub(crate) lock: Arc<Mutex<()>>,
    image: RwLock<RowImage>,
}

impl WalletRow {
    fn new(id: WalletId, user_id: UserId) -> Self {
        Self {
            id,
            user_id,
            lock: Arc::new(Mutex::new(())),
            image: RwLock::new(RowImage::Uncommitted),
        }
    }

    /// The last committed image, if the row is live
    pub(crate) fn committed(&self) -> Option<Wallet> {
        match &*self.image.read() {
            RowImage::Live(wallet) => Some(wallet.clone()),
            RowImage::Uncommitted | RowImage::Removed => None,
        }
    }

    pub(crate) fn publish(&self, wallet: Wallet) {
        *self.image.write() = RowImage::Live(wallet);
    }

    fn mark_removed(&self) {
        *self.image.write() = RowImage::Removed;
    }
}

/// The `wallets` table
#[derive(Debug)]
pub struct WalletStore {
    rows: DashMap<WalletId, Arc<WalletRow>>,

    /// Unique index on `user_id`
    by_user: DashMap<UserId, WalletId>,

    next_id: AtomicI64,

    /// Shared with the owning database
    commit_gate: Arc<RwLock<()>>,
}

impl WalletStore {
    pub(crate) fn new(commit_gate: Arc<RwLock<()>>) -> Self {
        Self {
            rows: DashMap::new(),
            by_user: DashMap::new(),
            next_id: AtomicI64::new(1),
            commit_gate,
        }
    }

    /// Committed wallet of `user_id`, without locking
    pub fn get_by_user_id(&self, user_id: UserId) -> Option<Wallet> {
        let wallet_id = self.by_user.get(&user_id).map(|id| *id)?;
        self.get_by_id(wallet_id)
    }

    /// Committed wallet with id `wallet_id`, without locking
    pub fn get_by_id(&self, wallet_id: WalletId) -> Option<Wallet> {
        let row = self.row(wallet_id)?;
        row.committed()
    }

    /// Every committed wallet, ordered by user id
    pub fn all(&self) -> Vec<Wallet> {
        let mut wallets: Vec<Wallet> = {
            let _gate = self.commit_gate.read();
            self.rows
                .iter()
                .filter_map(|row| row.value().committed())
                .collect()
        };
        wallets.sort_by_key(|wallet| wallet.user_id);
        wallets
    }

    /// Number of committed wallets
    pub fn len(&self) -> usize {
        let _gate = self.commit_gate.read();
        self.rows
            .iter()
            .filter(|row| row.value().committed().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock the wallet of `user_id` for the rest of the scope and read it
    ///
    /// Waits while another scope holds the row. Returns `Ok(None)` when the
    /// user has no wallet, including when the row disappeared while waiting.
    /// The returned image includes writes already staged in `scope`.
    pub async fn get_for_update(
        &self,
        scope: &mut Scope,
        user_id: UserId,
    ) -> Result<Option<Wallet>, StoreError> {
        scope.bind_wallets(self)?;

        loop {
            let Some(wallet_id) = self.by_user.get(&user_id).map(|id| *id) else {
                return Ok(None);
            };
            let Some(row) = self.row(wallet_id) else {
                return Ok(None);
            };

            scope.acquire(row).await?;
            if let Some(wallet) = scope.current(wallet_id) {
                return Ok(Some(wallet));
            }

            // The row was removed while we waited; follow the index once more
            // in case the user already has a replacement wallet.
            let replaced = self
                .by_user
                .get(&user_id)
                .map(|id| *id)
                .is_some_and(|id| id != wallet_id);
            if !replaced {
                return Ok(None);
            }
        }
    }

    /// Lock the wallet with id `wallet_id` for the rest of the scope and read it
    pub async fn lock_by_id(
        &self,
        scope: &mut Scope,
        wallet_id: WalletId,
    ) -> Result<Option<Wallet>, StoreError> {
        scope.bind_wallets(self)?;

        let Some(row) = self.row(wallet_id) else {
            return Ok(None);
        };
        scope.acquire(row).await?;
        Ok(scope.current(wallet_id))
    }

    /// Insert a wallet row, locked by `scope` until it ends
    ///
    /// Fails with `DuplicateWallet` when the user already has a wallet,
    /// committed or being created by another open scope. The new row is
    /// invisible to other readers until `scope` commits and vanishes if it
    /// rolls back.
    pub async fn create(
        &self,
        scope: &mut Scope,
        new_wallet: NewWallet,
    ) -> Result<Wallet, StoreError> {
        scope.bind_wallets(self)?;

        let wallet_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if new_wallet.balance.is_negative() {
            return Err(StoreError::NegativeBalance { wallet: wallet_id });
        }

        let row = Arc::new(WalletRow::new(wallet_id, new_wallet.user_id));
        let guard = Arc::clone(&row.lock).lock_owned().await;
        self.rows.insert(wallet_id, Arc::clone(&row));

        let indexed = *self
            .by_user
            .entry(new_wallet.user_id)
            .or_insert(wallet_id);
        if indexed != wallet_id {
            self.rows.remove(&wallet_id);
            row.mark_removed();
            return Err(StoreError::DuplicateWallet {
                user: new_wallet.user_id,
            });
        }

        let now = Utc::now();
        let wallet = Wallet {
            id: wallet_id,
            user_id: new_wallet.user_id,
            balance: new_wallet.balance,
            created_at: now,
            updated_at: now,
        };
        scope.record_created(row, guard, wallet.clone());

        tracing::debug!(
            scope = scope.id(),
            wallet = wallet_id,
            user = new_wallet.user_id,
            "Wallet row created"
        );
        Ok(wallet)
    }

    /// Stage a new balance on a row `scope` holds locked
    pub fn set_balance(
        &self,
        scope: &mut Scope,
        wallet_id: WalletId,
        balance: Money,
    ) -> Result<Wallet, StoreError> {
        scope.bind_wallets(self)?;

        if !scope.holds(wallet_id) {
            return Err(StoreError::NotLocked { wallet: wallet_id });
        }
        let mut wallet = scope
            .current(wallet_id)
            .ok_or(StoreError::WalletMissing { wallet: wallet_id })?;
        if balance.is_negative() {
            return Err(StoreError::NegativeBalance { wallet: wallet_id });
        }

        wallet.balance = balance;
        wallet.updated_at = Utc::now();
        scope.stage_update(wallet.clone());
        Ok(wallet)
    }

    /// Stage the removal of a row `scope` holds locked
    pub fn delete(&self, scope: &mut Scope, wallet_id: WalletId) -> Result<(), StoreError> {
        scope.bind_wallets(self)?;

        if !scope.holds(wallet_id) {
            return Err(StoreError::NotLocked { wallet: wallet_id });
        }
        if scope.current(wallet_id).is_none() {
            return Err(StoreError::WalletMissing { wallet: wallet_id });
        }
        scope.stage_delete(wallet_id);
        Ok(())
    }

    /// Drop a row from the table and its index
    ///
    /// Called with the row lock still held, so waiters see `Removed`.
    pub(crate) fn remove_row(&self, row: &WalletRow) {
        self.by_user
            .remove_if(&row.user_id, |_, wallet_id| *wallet_id == row.id);
        self.rows.remove(&row.id);
        row.mark_removed();
    }

    fn row(&self, wallet_id: WalletId) -> Option<Arc<WalletRow>> {
        self.rows.get(&wallet_id).map(|row| Arc::clone(row.value()))
    }
}
