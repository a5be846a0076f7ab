//! Ledger table
//!
//! Append-only record of balance movements. Entries are staged in a [`Scope`]
//! by [`LedgerStore::append`] and become visible when that scope commits.
//! A secondary index maps each wallet to the entries it appears in, on either
//! side, kept in `(created_at, id)` order so a page of history is a slice of it.
//! Reads spanning several entries hold the shared commit gate.

use super::scope::Scope;
use crate::types::{
    LedgerEntry, NewLedgerEntry, StoreError, TransactionId, TransactionStatus, WalletId,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

/// The `transactions` table
#[derive(Debug)]
pub struct LedgerStore {
    entries: DashMap<TransactionId, LedgerEntry>,

    /// Entry keys per wallet, sender and receiver side, ascending
    by_wallet: DashMap<WalletId, Vec<(DateTime<Utc>, TransactionId)>>,

    next_id: AtomicI64,

    /// Shared with the owning database
    closed: Arc<AtomicBool>,
    commit_gate: Arc<RwLock<()>>,
}

impl LedgerStore {
    pub(crate) fn new(closed: Arc<AtomicBool>, commit_gate: Arc<RwLock<()>>) -> Self {
        Self {
            entries: DashMap::new(),
            by_wallet: DashMap::new(),
            next_id: AtomicI64::new(1),
            closed,
            commit_gate,
        }
    }

    /// Stage a new entry in `scope`
    ///
    /// Returns the entry with its assigned id and timestamps. Rejects a
    /// non-positive amount, an entry with no side set, and an entry whose
    /// sender and receiver are the same wallet.
    pub fn append(
        &self,
        scope: &mut Scope,
        new_entry: NewLedgerEntry,
    ) -> Result<LedgerEntry, StoreError> {
        scope.bind_ledger(self)?;

        if !new_entry.amount.is_positive() {
            return Err(StoreError::constraint(format!(
                "ledger amount must be positive, got {}",
                new_entry.amount
            )));
        }
        match (new_entry.sender_wallet_id, new_entry.receiver_wallet_id) {
            (None, None) => {
                return Err(StoreError::constraint(
                    "ledger entry needs a sender or a receiver",
                ))
            }
            (Some(sender), Some(receiver)) if sender == receiver => {
                return Err(StoreError::constraint(format!(
                    "wallet {sender} cannot be both sender and receiver"
                )))
            }
            _ => {}
        }

        let now = Utc::now();
        let entry = LedgerEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            sender_wallet_id: new_entry.sender_wallet_id,
            receiver_wallet_id: new_entry.receiver_wallet_id,
            amount: new_entry.amount,
            status: new_entry.status,
            created_at: now,
            updated_at: now,
        };
        scope.stage_entry(entry.clone());
        Ok(entry)
    }

    /// Publish an entry staged by a committing scope
    ///
    /// Called with the commit gate held exclusively.
    pub(crate) fn insert_committed(&self, entry: LedgerEntry) {
        let key = (entry.created_at, entry.id);
        for wallet_id in [entry.sender_wallet_id, entry.receiver_wallet_id]
            .into_iter()
            .flatten()
        {
            let mut keys = self.by_wallet.entry(wallet_id).or_default();
            // Scopes commit out of id order now and then; usually this is the end.
            let at = keys.partition_point(|existing| *existing < key);
            keys.insert(at, key);
        }
        self.entries.insert(entry.id, entry);
    }

    pub fn get(&self, tx_id: TransactionId) -> Option<LedgerEntry> {
        self.entries.get(&tx_id).map(|entry| entry.value().clone())
    }

    /// Committed entries involving `wallet_id`, newest first
    ///
    /// Entries are ordered by `created_at` descending, ties broken by id
    /// descending. An offset past the end yields an empty page.
    pub fn list_by_wallet(
        &self,
        wallet_id: WalletId,
        limit: usize,
        offset: usize,
    ) -> Vec<LedgerEntry> {
        let _gate = self.commit_gate.read();
        self.newest_first(wallet_id, limit, offset)
    }

    /// Number of committed entries involving `wallet_id`
    pub fn count_by_wallet(&self, wallet_id: WalletId) -> usize {
        let _gate = self.commit_gate.read();
        self.indexed_count(wallet_id)
    }

    /// One page of `list_by_wallet` together with `count_by_wallet`, read
    /// between the same two commits
    pub(crate) fn page_by_wallet(
        &self,
        wallet_id: WalletId,
        limit: usize,
        offset: usize,
    ) -> (Vec<LedgerEntry>, usize) {
        let _gate = self.commit_gate.read();
        (
            self.newest_first(wallet_id, limit, offset),
            self.indexed_count(wallet_id),
        )
    }

    fn newest_first(&self, wallet_id: WalletId, limit: usize, offset: usize) -> Vec<LedgerEntry> {
        let Some(keys) = self.by_wallet.get(&wallet_id) else {
            return Vec::new();
        };
        let end = keys.len().saturating_sub(offset);
        let start = end.saturating_sub(limit);
        keys[start..end]
            .iter()
            .rev()
            .filter_map(|(_, tx_id)| self.get(*tx_id))
            .collect()
    }

    fn indexed_count(&self, wallet_id: WalletId) -> usize {
        self.by_wallet
            .get(&wallet_id)
            .map(|keys| keys.len())
            .unwrap_or(0)
    }

    /// Every committed entry, ordered by id
    pub fn all(&self) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = {
            let _gate = self.commit_gate.read();
            self.entries
                .iter()
                .map(|entry| entry.value().clone())
                .collect()
        };
        entries.sort_by_key(|entry| entry.id);
        entries
    }

    /// Move a pending entry to a terminal status
    ///
    /// Runs as one atomic row update, outside any scope.
    pub fn update_status(
        &self,
        tx_id: TransactionId,
        status: TransactionStatus,
    ) -> Result<LedgerEntry, StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        if !status.is_terminal() {
            return Err(StoreError::constraint(format!(
                "status of entry {tx_id} can only move to a terminal state"
            )));
        }

        let mut entry = self
            .entries
            .get_mut(&tx_id)
            .ok_or(StoreError::EntryNotFound { tx: tx_id })?;
        if entry.status.is_terminal() {
            return Err(StoreError::ImmutableEntry {
                tx: tx_id,
                status: entry.status,
            });
        }

        entry.status = status;
        entry.updated_at = Utc::now();
        tracing::debug!(tx = tx_id, status = %status, "Ledger entry status updated");
        Ok(entry.value().clone())
    }
}
