//! Transaction scope: the capability every atomic store call goes through
//!
//! A `Scope` is passed explicitly (`&mut Scope`) to every store operation that
//! must take part in the same unit of work. It owns:
//!
//! - the exclusive row locks acquired so far,
//! - the staged wallet writes (creates, balance updates, deletes),
//! - the staged ledger entries.
//!
//! Nothing staged is visible to other readers until [`Scope::commit`]. A scope
//! that is dropped without committing rolls back: staged writes are discarded,
//! rows it created are removed, and its locks are released. This covers early
//! returns, `?` propagation, panics and a caller dropping an in-flight future.

use super::database::Tables;
use super::ledger_store::LedgerStore;
use super::wallet_store::{WalletRow, WalletStore};
use crate::types::{LedgerEntry, StoreError, Wallet, WalletId};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;

/// A wallet row together with the lock this scope holds on it
struct HeldRow {
    row: Arc<WalletRow>,
    _guard: OwnedMutexGuard<()>,
}

/// Unit of work over the wallet and ledger tables
pub struct Scope {
    id: u64,
    tables: Arc<Tables>,
    deadline: Instant,
    lock_wait_timeout: Duration,
    locks: BTreeMap<WalletId, HeldRow>,
    acquisition_order: Vec<WalletId>,
    created: Vec<WalletId>,
    staged: BTreeMap<WalletId, Wallet>,
    deleted: BTreeSet<WalletId>,
    appended: Vec<LedgerEntry>,
    finished: bool,
}

impl Scope {
    pub(crate) fn new(
        id: u64,
        tables: Arc<Tables>,
        deadline: Instant,
        lock_wait_timeout: Duration,
    ) -> Self {
        Self {
            id,
            tables,
            deadline,
            lock_wait_timeout,
            locks: BTreeMap::new(),
            acquisition_order: Vec::new(),
            created: Vec::new(),
            staged: BTreeMap::new(),
            deleted: BTreeSet::new(),
            appended: Vec::new(),
            finished: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wallet ids in the order their locks were acquired
    pub fn lock_order(&self) -> &[WalletId] {
        &self.acquisition_order
    }

    /// Publish every staged write, then release every lock
    ///
    /// Wallet images and ledger entries are published under the exclusive
    /// commit gate, so a multi-row reader sees all of them or none.
    /// Fails with `Closed` if the database went away; the scope is then rolled
    /// back and nothing is published.
    pub fn commit(mut self) -> Result<(), StoreError> {
        self.tables.ensure_open()?;

        let entries = std::mem::take(&mut self.appended);
        let entry_count = entries.len();
        {
            let tables = &self.tables;
            let _gate = tables.commit_gate.write();
            for (wallet_id, held) in &self.locks {
                if self.deleted.contains(wallet_id) {
                    tables.wallets.remove_row(&held.row);
                } else if let Some(wallet) = self.staged.remove(wallet_id) {
                    held.row.publish(wallet);
                }
            }
            for entry in entries {
                tables.ledger.insert_committed(entry);
            }
        }

        self.finished = true;
        tracing::debug!(
            scope = self.id,
            locked = self.locks.len(),
            deleted = self.deleted.len(),
            entries = entry_count,
            "Scope committed"
        );
        Ok(())
    }

    /// Discard every staged write and release every lock
    pub fn rollback(self) {
        drop(self);
    }

    pub(crate) fn bind_wallets(&self, store: &WalletStore) -> Result<(), StoreError> {
        if !std::ptr::eq(&self.tables.wallets, store) {
            return Err(StoreError::ForeignScope);
        }
        self.tables.ensure_open()
    }

    pub(crate) fn bind_ledger(&self, store: &LedgerStore) -> Result<(), StoreError> {
        if !std::ptr::eq(&self.tables.ledger, store) {
            return Err(StoreError::ForeignScope);
        }
        self.tables.ensure_open()
    }

    pub(crate) fn holds(&self, wallet_id: WalletId) -> bool {
        self.locks.contains_key(&wallet_id)
    }

    /// The wallet as this scope sees it: staged image first, then committed image
    pub(crate) fn current(&self, wallet_id: WalletId) -> Option<Wallet> {
        if self.deleted.contains(&wallet_id) {
            return None;
        }
        if let Some(wallet) = self.staged.get(&wallet_id) {
            return Some(wallet.clone());
        }
        self.locks.get(&wallet_id).and_then(|held| held.row.committed())
    }

    /// Wait for the exclusive lock on `row`
    ///
    /// The wait ends at the earlier of the scope deadline and the lock wait
    /// timeout. A row already held by this scope is not locked twice.
    pub(crate) async fn acquire(&mut self, row: Arc<WalletRow>) -> Result<(), StoreError> {
        if self.holds(row.id) {
            return Ok(());
        }

        let limit = std::cmp::min(self.deadline, Instant::now() + self.lock_wait_timeout);
        let lock = Arc::clone(&row.lock);
        match tokio::time::timeout_at(limit, lock.lock_owned()).await {
            Ok(guard) => {
                self.acquisition_order.push(row.id);
                self.locks.insert(row.id, HeldRow { row, _guard: guard });
                Ok(())
            }
            Err(_) => {
                tracing::warn!(scope = self.id, wallet = row.id, "Lock wait timed out");
                Err(StoreError::LockTimeout { wallet: row.id })
            }
        }
    }

    pub(crate) fn record_created(
        &mut self,
        row: Arc<WalletRow>,
        guard: OwnedMutexGuard<()>,
        wallet: Wallet,
    ) {
        self.created.push(row.id);
        self.acquisition_order.push(row.id);
        self.staged.insert(row.id, wallet);
        self.locks.insert(row.id, HeldRow { row, _guard: guard });
    }

    pub(crate) fn stage_update(&mut self, wallet: Wallet) {
        self.staged.insert(wallet.id, wallet);
    }

    pub(crate) fn stage_delete(&mut self, wallet_id: WalletId) {
        self.staged.remove(&wallet_id);
        self.deleted.insert(wallet_id);
    }

    pub(crate) fn stage_entry(&mut self, entry: LedgerEntry) {
        self.appended.push(entry);
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        // Rows created here must leave the indexes before their locks are
        // released, so waiters wake up to a row that no longer exists.
        for wallet_id in &self.created {
            if let Some(held) = self.locks.get(wallet_id) {
                self.tables.wallets.remove_row(&held.row);
            }
        }

        if !self.locks.is_empty() || !self.appended.is_empty() {
            tracing::debug!(
                scope = self.id,
                locked = self.locks.len(),
                discarded_entries = self.appended.len(),
                "Scope rolled back"
            );
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("deadline", &self.deadline)
            .field("locked", &self.acquisition_order)
            .field("staged_wallets", &self.staged.len())
            .field("staged_entries", &self.appended.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Database;
    use crate::types::{Money, NewLedgerEntry, NewWallet};

    async fn seeded(database: &Database, user_id: i64, balance: i64) -> Wallet {
        let mut scope = database.begin().unwrap();
        let wallet = database
            .wallets()
            .create(
                &mut scope,
                NewWallet {
                    user_id,
                    balance: Money::from_minor_units(balance),
                },
            )
            .await
            .unwrap();
        scope.commit().unwrap();
        wallet
    }

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let database = Database::default();
        let wallet = seeded(&database, 1, 1_000).await;

        let mut scope = database.begin().unwrap();
        database.wallets().lock_by_id(&mut scope, wallet.id).await.unwrap();
        database
            .wallets()
            .set_balance(&mut scope, wallet.id, Money::from_minor_units(2_500))
            .unwrap();

        let outside = database.wallets().get_by_id(wallet.id).unwrap();
        assert_eq!(outside.balance, Money::from_minor_units(1_000));

        scope.commit().unwrap();
        let outside = database.wallets().get_by_id(wallet.id).unwrap();
        assert_eq!(outside.balance, Money::from_minor_units(2_500));
    }

    #[tokio::test]
    async fn test_drop_rolls_back_everything() {
        let database = Database::default();
        let wallet = seeded(&database, 1, 1_000).await;

        {
            let mut scope = database.begin().unwrap();
            database.wallets().lock_by_id(&mut scope, wallet.id).await.unwrap();
            database
                .wallets()
                .set_balance(&mut scope, wallet.id, Money::ZERO)
                .unwrap();
            database
                .ledger()
                .append(
                    &mut scope,
                    NewLedgerEntry::top_up(wallet.id, Money::from_minor_units(1)),
                )
                .unwrap();
            database
                .wallets()
                .create(
                    &mut scope,
                    NewWallet {
                        user_id: 2,
                        balance: Money::ZERO,
                    },
                )
                .await
                .unwrap();
        }

        assert_eq!(
            database.wallets().get_by_id(wallet.id).unwrap().balance,
            Money::from_minor_units(1_000)
        );
        assert!(database.wallets().get_by_user_id(2).is_none());
        assert!(database.ledger().all().is_empty());

        // The lock was released with the scope
        let mut scope = database.begin().unwrap();
        assert!(database
            .wallets()
            .lock_by_id(&mut scope, wallet.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_commit_fails_when_closed_and_rolls_back() {
        let database = Database::default();
        let wallet = seeded(&database, 1, 1_000).await;

        let mut scope = database.begin().unwrap();
        database.wallets().lock_by_id(&mut scope, wallet.id).await.unwrap();
        database
            .wallets()
            .set_balance(&mut scope, wallet.id, Money::ZERO)
            .unwrap();

        database.close();
        assert_eq!(scope.commit().unwrap_err(), StoreError::Closed);
        assert_eq!(
            database.wallets().get_by_id(wallet.id).unwrap().balance,
            Money::from_minor_units(1_000)
        );
    }

    #[tokio::test]
    async fn test_reads_own_writes() {
        let database = Database::default();
        let wallet = seeded(&database, 1, 1_000).await;

        let mut scope = database.begin().unwrap();
        database.wallets().lock_by_id(&mut scope, wallet.id).await.unwrap();
        database
            .wallets()
            .set_balance(&mut scope, wallet.id, Money::from_minor_units(10))
            .unwrap();

        let seen = database
            .wallets()
            .get_for_update(&mut scope, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen.balance, Money::from_minor_units(10));
        assert_eq!(scope.lock_order(), &[wallet.id]);
    }

    #[tokio::test]
    async fn test_foreign_scope_rejected() {
        let first = Database::default();
        let second = Database::default();
        let wallet = seeded(&first, 1, 100).await;

        let mut scope = second.begin().unwrap();
        let err = first
            .wallets()
            .lock_by_id(&mut scope, wallet.id)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::ForeignScope);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_wait_bounded_by_deadline() {
        let database = Database::default();
        let wallet = seeded(&database, 1, 100).await;

        let mut holder = database.begin().unwrap();
        database.wallets().lock_by_id(&mut holder, wallet.id).await.unwrap();

        let deadline = Instant::now() + Duration::from_millis(50);
        let mut waiter = database.begin_until(deadline).unwrap();
        let err = database
            .wallets()
            .lock_by_id(&mut waiter, wallet.id)
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::LockTimeout { wallet: wallet.id });
        assert!(Instant::now() >= deadline);
    }
}
