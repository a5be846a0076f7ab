//! Read-only pagination over the ledger

use super::database::Database;
use crate::config::LedgerConfig;
use crate::types::{LedgerEntry, LedgerError, UserId};
use serde::Serialize;

/// One page of a wallet's ledger history, newest entry first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryPage {
    pub entries: Vec<LedgerEntry>,

    /// 1-based page number actually served
    pub page: u32,

    /// Page size actually applied
    pub limit: u32,

    /// Number of entries involving the wallet across all pages
    pub total: u64,

    /// The following page, if any entries remain after this one
    pub next_page: Option<u32>,
}

/// History facade keyed by user
#[derive(Debug, Clone)]
pub struct History {
    database: Database,
    default_page_size: u32,
    max_page_size: u32,
}

impl History {
    pub fn new(database: Database, config: &LedgerConfig) -> Self {
        Self {
            database,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    /// Page `page` of the ledger entries involving the wallet of `user_id`
    ///
    /// Page 0 is served as page 1. A limit of 0 uses the default page size and
    /// a limit above the maximum is capped. Fails with `WalletNotFound` when
    /// the user has no wallet.
    pub fn get_history(
        &self,
        user_id: UserId,
        page: u32,
        limit: u32,
    ) -> Result<HistoryPage, LedgerError> {
        self.database.ensure_open()?;

        let wallet = self
            .database
            .wallets()
            .get_by_user_id(user_id)
            .ok_or_else(|| LedgerError::wallet_not_found(user_id))?;

        let page = page.max(1);
        let limit = match limit {
            0 => self.default_page_size,
            n => n.min(self.max_page_size),
        };
        let offset = (page as usize - 1).saturating_mul(limit as usize);

        let (entries, total) = self
            .database
            .ledger()
            .page_by_wallet(wallet.id, limit as usize, offset);
        let next_page = (offset.saturating_add(entries.len()) < total).then(|| page + 1);

        Ok(HistoryPage {
            entries,
            page,
            limit,
            total: total as u64,
            next_page,
        })
    }
}
