//! Replay strategy module
//!
//! This module defines the Strategy pattern for complete replay pipelines,
//! covering both CSV parsing and submission of every operation to a
//! [`WalletService`]. Different implementations (sequential, concurrent batch)
//! can be selected at runtime.

use crate::cli::StrategyType;
use crate::core::{BalanceEngine, WalletService};
use crate::types::{LedgerError, Operation};
use std::path::Path;

pub mod r#async;
pub mod batch_processor;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use batch_processor::{BatchProcessor, ProcessingResult};
pub use sync::SyncProcessingStrategy;

/// Counts of what a replay did with the operations it read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Operations the engine committed
    pub applied: usize,

    /// Operations the engine refused (validation, balance, missing wallet, ...)
    pub rejected: usize,
}

impl ReplaySummary {
    pub fn record(&mut self, result: &Result<(), LedgerError>) {
        match result {
            Ok(()) => self.applied += 1,
            Err(_) => self.rejected += 1,
        }
    }

    pub fn merge(&mut self, other: ReplaySummary) {
        self.applied += other.applied;
        self.rejected += other.rejected;
    }
}

/// Replay pipeline trait
///
/// Each strategy reads operations from a CSV file and submits them to the
/// engine. Final wallet state is read back from the engine by the caller.
pub trait ProcessingStrategy: Send + Sync {
    /// Replay every operation of `input_path` through `engine`
    ///
    /// # Errors
    ///
    /// Returns an error if the input file cannot be opened or the runtime
    /// cannot be started. Rejected operations and malformed rows are logged
    /// and never stop the replay.
    fn process(&self, input_path: &Path, engine: &BalanceEngine) -> Result<ReplaySummary, String>;
}

/// Submit one operation to `service`
///
/// Rejections are logged here so every strategy reports them the same way.
pub async fn apply_operation<S: WalletService>(
    service: &S,
    operation: &Operation,
) -> Result<(), LedgerError> {
    let result = match *operation {
        Operation::TopUp { user, amount } => service.top_up(user, amount).await.map(|_| ()),
        Operation::Transfer {
            sender,
            receiver,
            amount,
        } => service.transfer(sender, receiver, amount).await.map(|_| ()),
    };

    if let Err(e) = &result {
        tracing::warn!(
            operation = operation.name(),
            user = operation.initiator(),
            error = %e,
            retryable = e.is_retryable(),
            "Operation rejected"
        );
    }
    result
}

/// Create a replay strategy based on the specified strategy type
///
/// `config` is only read by the async strategy.
pub fn create_strategy(
    strategy_type: StrategyType,
    config: Option<BatchConfig>,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy),
        StrategyType::Async => {
            let config = config.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(config))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_apply_operation_reports_outcome() {
        let engine = BalanceEngine::with_config(&LedgerConfig::default());
        let mut summary = ReplaySummary::default();

        let operations = [
            Operation::TopUp {
                user: 1,
                amount: dec!(10),
            },
            Operation::Transfer {
                sender: 1,
                receiver: 1,
                amount: dec!(1),
            },
            Operation::Transfer {
                sender: 1,
                receiver: 2,
                amount: dec!(1),
            },
        ];
        for operation in &operations {
            summary.record(&apply_operation(&engine, operation).await);
        }

        assert_eq!(
            summary,
            ReplaySummary {
                applied: 1,
                rejected: 2
            }
        );
    }

    #[test]
    fn test_summary_merge() {
        let mut total = ReplaySummary {
            applied: 2,
            rejected: 1,
        };
        total.merge(ReplaySummary {
            applied: 3,
            rejected: 0,
        });
        assert_eq!(total.applied, 5);
        assert_eq!(total.rejected, 1);
    }
}
