//! Sequential replay strategy
//!
//! Replays operations one at a time, in file order, on a current-thread
//! runtime. Delegates:
//! - CSV parsing to `SyncReader` (iterator interface)
//! - Balance mutations to `BalanceEngine`
//!
//! Records are streamed, so memory use does not grow with the input file.

use crate::core::BalanceEngine;
use crate::io::sync_reader::SyncReader;
use crate::strategy::{apply_operation, ProcessingStrategy, ReplaySummary};
use std::path::Path;

/// Sequential replay strategy
///
/// ```no_run
/// use wallet_ledger::config::LedgerConfig;
/// use wallet_ledger::core::BalanceEngine;
/// use wallet_ledger::strategy::{ProcessingStrategy, SyncProcessingStrategy};
/// use std::path::Path;
///
/// let engine = BalanceEngine::with_config(&LedgerConfig::default());
/// let summary = SyncProcessingStrategy
///     .process(Path::new("operations.csv"), &engine)
///     .expect("Replay failed");
/// println!("{} applied, {} rejected", summary.applied, summary.rejected);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SyncProcessingStrategy;

impl ProcessingStrategy for SyncProcessingStrategy {
    fn process(&self, input_path: &Path, engine: &BalanceEngine) -> Result<ReplaySummary, String> {
        let reader = SyncReader::new(input_path)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        let summary = runtime.block_on(async {
            let mut summary = ReplaySummary::default();
            for result in reader {
                match result {
                    Ok(operation) => {
                        summary.record(&apply_operation(engine, &operation).await);
                    }
                    Err(e) => tracing::warn!(error = %e, "Skipping record"),
                }
            }
            summary
        });

        tracing::info!(
            strategy = "sync",
            applied = summary.applied,
            rejected = summary.rejected,
            "Replay finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::types::Money;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    fn engine() -> BalanceEngine {
        BalanceEngine::with_config(&LedgerConfig::default())
    }

    #[test]
    fn test_sync_strategy_replays_in_order() {
        let file = create_temp_csv(
            "type,user,counterparty,amount\n\
             topup,1,,100.00\n\
             topup,2,,0.50\n\
             transfer,1,2,40\n\
             transfer,2,1,40.25\n",
        );
        let engine = engine();

        let summary = SyncProcessingStrategy.process(file.path(), &engine).unwrap();
        assert_eq!(summary.applied, 4);
        assert_eq!(summary.rejected, 0);
        assert_eq!(
            engine.get_balance(1).unwrap().balance,
            Money::from_minor_units(10_025)
        );
        assert_eq!(
            engine.get_balance(2).unwrap().balance,
            Money::from_minor_units(25)
        );
    }

    #[test]
    fn test_sync_strategy_counts_rejections_and_skips_malformed_rows() {
        let file = create_temp_csv(
            "type,user,counterparty,amount\n\
             topup,1,,10\n\
             topup,2,,invalid\n\
             transfer,1,3,5\n\
             transfer,1,1,5\n\
             topup,3,,-1\n",
        );
        let engine = engine();

        let summary = SyncProcessingStrategy.process(file.path(), &engine).unwrap();
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.rejected, 3);
        assert_eq!(engine.database().wallets().len(), 1);
    }

    #[test]
    fn test_sync_strategy_handles_missing_file() {
        let result = SyncProcessingStrategy.process(Path::new("nonexistent.csv"), &engine());
        assert!(result.unwrap_err().contains("Failed to open file"));
    }

    #[test]
    fn test_sync_strategy_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncProcessingStrategy>();
    }
}
