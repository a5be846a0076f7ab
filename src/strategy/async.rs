//! Concurrent batch replay strategy
//!
//! Replays operations in batches on a multi-threaded runtime.
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── AsyncReader (batch CSV reading)
//!     └── BatchProcessor (user partitioning + tasks)
//!         └── BalanceEngine (row locks, scopes)
//! ```
//!
//! # Ordering
//!
//! - Batches are replayed one after another
//! - Within a batch, groups of operations sharing no user run concurrently
//! - Operations sharing a user keep their file order
//!
//! The final balances therefore match a sequential replay of the same file.

use crate::core::BalanceEngine;
use crate::io::async_reader::AsyncReader;
use crate::strategy::{BatchProcessor, ProcessingStrategy, ReplaySummary};
use std::path::Path;
use std::sync::Arc;

/// Configuration for batch replay
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Number of operations per batch
    pub batch_size: usize,
    /// Number of runtime worker threads
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a BatchConfig, replacing zero values with the defaults
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            tracing::warn!(
                batch_size,
                default = default.batch_size,
                "Invalid batch_size, using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            tracing::warn!(
                max_concurrent_batches,
                default = default.max_concurrent_batches,
                "Invalid max_concurrent_batches, using default"
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Concurrent batch replay strategy
#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    config: BatchConfig,
}

impl AsyncProcessingStrategy {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    /// Replay `input_path` batch by batch
    ///
    /// Each batch completes before the next one is read, so a user whose
    /// operations span several batches still sees them in file order.
    fn process(&self, input_path: &Path, engine: &BalanceEngine) -> Result<ReplaySummary, String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent_batches)
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        let summary = runtime.block_on(async {
            let processor = BatchProcessor::new(Arc::new(engine.clone()));

            let file = tokio::fs::File::open(input_path)
                .await
                .map_err(|e| format!("Failed to open file '{}': {}", input_path.display(), e))?;
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            let mut summary = ReplaySummary::default();
            let mut batches = 0usize;
            loop {
                let batch = reader.read_batch(self.config.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                batches += 1;
                let mut batch_summary = ReplaySummary::default();
                for processed in processor.process_batch(batch).await {
                    batch_summary.record(&processed.result);
                }
                tracing::debug!(
                    batch = batches,
                    applied = batch_summary.applied,
                    rejected = batch_summary.rejected,
                    "Batch replayed"
                );
                summary.merge(batch_summary);
            }

            tracing::debug!(batches, "All batches replayed");
            Ok::<_, String>(summary)
        })?;

        tracing::info!(
            strategy = "async",
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
    use crate::strategy::SyncProcessingStrategy;
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
    fn test_batch_config_replaces_zero_values() {
        let config = BatchConfig::new(0, 0);
        assert_eq!(config.batch_size, 1000);
        assert!(config.max_concurrent_batches >= 1);

        let config = BatchConfig::new(5, 2);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.max_concurrent_batches, 2);
    }

    #[test]
    fn test_async_strategy_handles_missing_file() {
        let strategy = AsyncProcessingStrategy::new(BatchConfig::default());
        let result = strategy.process(Path::new("nonexistent.csv"), &engine());
        assert!(result.unwrap_err().contains("Failed to open file"));
    }

    #[test]
    fn test_async_strategy_maintains_ordering_across_batches() {
        // User 1's transfers only succeed if the top-up before them ran first
        let file = create_temp_csv(
            "type,user,counterparty,amount\n\
             topup,1,,100\n\
             topup,2,,50\n\
             transfer,1,2,30\n\
             topup,3,,25\n\
             transfer,1,3,70\n\
             transfer,2,1,80\n",
        );
        let engine = engine();

        let strategy = AsyncProcessingStrategy::new(BatchConfig::new(2, 4));
        let summary = strategy.process(file.path(), &engine).unwrap();

        assert_eq!(summary.applied, 6);
        assert_eq!(engine.get_balance(1).unwrap().balance.to_string(), "80.00");
        assert_eq!(engine.get_balance(2).unwrap().balance.to_string(), "0.00");
        assert_eq!(engine.get_balance(3).unwrap().balance.to_string(), "95.00");
    }

    #[test]
    fn test_async_matches_sync_replay() {
        let mut content = String::from("type,user,counterparty,amount\n");
        for user in 1..=20 {
            content.push_str(&format!("topup,{user},,{}.{:02}\n", user * 3, user));
        }
        for i in 0..200 {
            let sender = i % 20 + 1;
            let receiver = (i * 7) % 20 + 1;
            content.push_str(&format!("transfer,{sender},{receiver},{}.5\n", i % 9));
        }
        let file = create_temp_csv(&content);

        let sync_engine = engine();
        let sync_summary = SyncProcessingStrategy
            .process(file.path(), &sync_engine)
            .unwrap();

        let async_engine = engine();
        let async_summary = AsyncProcessingStrategy::new(BatchConfig::new(16, 4))
            .process(file.path(), &async_engine)
            .unwrap();

        assert_eq!(sync_summary, async_summary);
        let balances = |engine: &BalanceEngine| -> Vec<(i64, String)> {
            engine
                .database()
                .wallets()
                .all()
                .into_iter()
                .map(|w| (w.user_id, w.balance.to_string()))
                .collect()
        };
        assert_eq!(balances(&sync_engine), balances(&async_engine));
    }
}
