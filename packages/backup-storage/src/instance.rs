// A configured storage bound to its place in the run
use crate::logger::LogSink;
use crate::storage::{build_backend, StorageBackend, StorageConfig, TransferStrategy};
use std::sync::Arc;

/// One destination for a run.
///
/// The transfer strategy is fixed when the instance is built, from its
/// position among the run's storages, and never re-evaluated.
pub struct StorageInstance {
    config: StorageConfig,
    backend: Box<dyn StorageBackend>,
    ordinal: usize,
    total: usize,
    strategy: TransferStrategy,
}

impl StorageInstance {
    pub fn new(config: StorageConfig, backend: Box<dyn StorageBackend>, ordinal: usize, total: usize) -> Self {
        let strategy = TransferStrategy::resolve(ordinal, total);
        Self {
            config,
            backend,
            ordinal,
            total,
            strategy,
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn strategy(&self) -> TransferStrategy {
        self.strategy
    }

    pub fn keep(&self) -> Option<usize> {
        self.config.keep
    }

    pub fn storage_name(&self) -> String {
        self.backend.storage_name()
    }
}

impl std::fmt::Debug for StorageInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageInstance")
            .field("storage", &self.storage_name())
            .field("ordinal", &self.ordinal)
            .field("total", &self.total)
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// Build the run's instances from configuration, preserving order
pub fn instances_for(configs: Vec<StorageConfig>, log: Arc<dyn LogSink>) -> Vec<StorageInstance> {
    let total = configs.len();
    configs
        .into_iter()
        .enumerate()
        .map(|(ordinal, config)| {
            let backend = build_backend(&config, log.clone());
            StorageInstance::new(config, backend, ordinal, total)
        })
        .collect()
}
