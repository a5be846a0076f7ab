//! In-process transactional store
//!
//! `Database` owns the wallet and ledger tables and hands out [`Scope`]s, the
//! unit of work in which row locks are held and writes become all-or-nothing.
//!
//! # Architecture
//!
//! ```text
//! Database (Clone, Arc-shared)
//!     └── Tables
//!         ├── WalletStore  (rows with per-row async locks, unique user index)
//!         ├── LedgerStore  (append-only entries, index by wallet)
//!         ├── commit gate  (commits publish as one step to lock-free readers)
//!         └── closed flag  (simulated loss of the backing store)
//! ```

use super::ledger_store::LedgerStore;
use super::scope::Scope;
use super::wallet_store::WalletStore;
use crate::config::LedgerConfig;
use crate::types::StoreError;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Tables shared by every handle and every open scope
#[derive(Debug)]
pub(crate) struct Tables {
    pub(crate) wallets: WalletStore,
    pub(crate) ledger: LedgerStore,

    /// Held exclusively while a scope publishes, shared by multi-row readers
    pub(crate) commit_gate: Arc<RwLock<()>>,

    closed: Arc<AtomicBool>,
    next_scope: AtomicU64,
}

impl Tables {
    pub(crate) fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

/// Handle to the wallet and ledger tables
///
/// Cloning is cheap; every clone refers to the same tables.
#[derive(Debug, Clone)]
pub struct Database {
    tables: Arc<Tables>,
    lock_wait_timeout: Duration,
    operation_timeout: Duration,
}

impl Database {
    pub fn new(config: &LedgerConfig) -> Self {
        let closed = Arc::new(AtomicBool::new(false));
        let commit_gate = Arc::new(RwLock::new(()));
        Self {
            tables: Arc::new(Tables {
                wallets: WalletStore::new(Arc::clone(&commit_gate)),
                ledger: LedgerStore::new(Arc::clone(&closed), Arc::clone(&commit_gate)),
                commit_gate,
                closed,
                next_scope: AtomicU64::new(1),
            }),
            lock_wait_timeout: config.lock_wait_timeout(),
            operation_timeout: config.operation_timeout(),
        }
    }

    /// Open a scope that must finish within the configured operation timeout
    pub fn begin(&self) -> Result<Scope, StoreError> {
        self.begin_until(Instant::now() + self.operation_timeout)
    }

    /// Open a scope bounded by a caller-supplied deadline
    ///
    /// Any lock wait inside the scope gives up at the earlier of `deadline`
    /// and the configured lock wait timeout.
    pub fn begin_until(&self, deadline: Instant) -> Result<Scope, StoreError> {
        self.tables.ensure_open()?;
        let id = self.tables.next_scope.fetch_add(1, Ordering::Relaxed);
        Ok(Scope::new(
            id,
            Arc::clone(&self.tables),
            deadline,
            self.lock_wait_timeout,
        ))
    }

    pub fn wallets(&self) -> &WalletStore {
        &self.tables.wallets
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.tables.ledger
    }

    /// Take the store offline; every later scope, scoped call and commit fails
    pub fn close(&self) {
        if !self.tables.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("Database closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tables.closed.load(Ordering::Acquire)
    }

    pub fn ensure_open(&self) -> Result<(), StoreError> {
        self.tables.ensure_open()
    }

    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new(&LedgerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_get_increasing_ids() {
        let database = Database::default();
        let first = database.begin().unwrap();
        let second = database.begin().unwrap();
        assert!(second.id() > first.id());
    }

    #[test]
    fn test_begin_fails_once_closed() {
        let database = Database::default();
        database.close();

        assert!(database.is_closed());
        assert_eq!(database.begin().unwrap_err(), StoreError::Closed);
        assert_eq!(database.ensure_open().unwrap_err(), StoreError::Closed);
    }

    #[test]
    fn test_clones_share_tables() {
        let database = Database::default();
        let clone = database.clone();
        clone.close();
        assert!(database.is_closed());
        assert!(std::ptr::eq(database.wallets(), clone.wallets()));
    }

    #[test]
    fn test_timeouts_come_from_config() {
        let config = LedgerConfig {
            operation_timeout_ms: 1_500,
            ..LedgerConfig::default()
        };
        let database = Database::new(&config);
        assert_eq!(database.operation_timeout(), Duration::from_millis(1_500));
    }
}
