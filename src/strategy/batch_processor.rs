//! Batch processing with user-based partitioning
//!
//! This module provides the `BatchProcessor` struct, which replays a batch of
//! operations concurrently while keeping the outcome identical to a
//! sequential replay.
//!
//! # Design
//!
//! Two operations conflict when they touch a common user. The batch is split
//! into groups such that operations in different groups share no user, even
//! transitively (a transfer 1→2 and a transfer 2→3 land in the same group).
//! Each group is replayed sequentially in file order on its own task; groups
//! run concurrently.
//!
//! # Architecture
//!
//! ```text
//! BatchProcessor<S>
//!     └── Arc<S: WalletService>  (shared service, e.g. BalanceEngine)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use super::apply_operation;
use crate::core::WalletService;
use crate::types::{LedgerError, Operation, UserId};

/// Result of replaying a single operation
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub operation: Operation,
    pub result: Result<(), LedgerError>,
}

/// Batch processor with user-based partitioning
#[derive(Debug)]
pub struct BatchProcessor<S> {
    service: Arc<S>,
}

impl<S> Clone for BatchProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<S: WalletService + 'static> BatchProcessor<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    /// Split a batch into groups of operations that share no user
    ///
    /// # Guarantees
    ///
    /// - Each operation appears in exactly one group
    /// - Operations keep their original relative order inside a group
    /// - Groups are ordered by their first operation in the batch
    pub fn partition_by_users(&self, batch: Vec<Operation>) -> Vec<Vec<Operation>> {
        let mut users = UserSets::default();
        for operation in &batch {
            let initiator = users.index_of(operation.initiator());
            if let Some(counterparty) = operation.counterparty() {
                let counterparty = users.index_of(counterparty);
                users.union(initiator, counterparty);
            }
        }

        let mut group_of_root: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<Vec<Operation>> = Vec::new();
        for operation in batch {
            let index = users.index_of(operation.initiator());
            let root = users.find(index);
            let group = *group_of_root.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[group].push(operation);
        }

        groups
    }

    /// Replay one group sequentially, in order
    ///
    /// Every operation is submitted even if an earlier one failed.
    pub async fn process_group(&self, operations: Vec<Operation>) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(operations.len());

        for operation in operations {
            let result = apply_operation(self.service.as_ref(), &operation).await;
            results.push(ProcessingResult { operation, result });
        }

        results
    }

    /// Replay a batch, running independent groups concurrently
    ///
    /// Results are grouped, not in input order.
    pub async fn process_batch(&self, batch: Vec<Operation>) -> Vec<ProcessingResult> {
        let groups = self.partition_by_users(batch);

        let mut tasks = Vec::with_capacity(groups.len());
        for operations in groups {
            let processor = self.clone();
            tasks.push(tokio::spawn(async move {
                processor.process_group(operations).await
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            match task.await {
                Ok(group_results) => results.extend(group_results),
                Err(e) => tracing::error!(error = %e, "Replay task failed"),
            }
        }

        results
    }
}

/// Disjoint sets of users (union-find with path halving)
#[derive(Debug, Default)]
struct UserSets {
    index: HashMap<UserId, usize>,
    parent: Vec<usize>,
}

impl UserSets {
    fn index_of(&mut self, user: UserId) -> usize {
        let next = self.parent.len();
        let index = *self.index.entry(user).or_insert(next);
        if index == next {
            self.parent.push(next);
        }
        index
    }

    fn find(&mut self, mut index: usize) -> usize {
        while self.parent[index] != index {
            self.parent[index] = self.parent[self.parent[index]];
            index = self.parent[index];
        }
        index
    }

    fn union(&mut self, a: usize, b: usize) {
        let (root_a, root_b) = (self.find(a), self.find(b));
        if root_a != root_b {
            let (low, high) = if root_a < root_b {
                (root_a, root_b)
            } else {
                (root_b, root_a)
            };
            self.parent[high] = low;
        }
    }
}
