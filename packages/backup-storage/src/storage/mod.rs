// Storage backend trait and implementations

pub mod config;
pub mod local;

use crate::error::StorageError;
use crate::logger::LogSink;
use crate::package::{ManifestEntry, Package, PackageId};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

pub use config::{RunConfig, StorageConfig, StorageKind};
pub use local::LocalStorage;

/// How staged chunks are placed at a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStrategy {
    /// Rename into place; the staged file is gone afterwards
    Move,
    /// Copy into place; the staged file is left for later storages
    Copy,
}

impl TransferStrategy {
    /// Only the last storage of a run may consume the staged files
    pub fn resolve(ordinal: usize, total: usize) -> Self {
        if ordinal + 1 >= total {
            TransferStrategy::Move
        } else {
            TransferStrategy::Copy
        }
    }
}

/// Storage backend trait for delivering and cycling packages
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name used in log messages, e.g. `Storage::Local`
    fn storage_name(&self) -> String;

    /// Destination container for a package
    fn remote_path_for(&self, id: &PackageId) -> PathBuf;

    /// Deliver every chunk of the package, in staged order
    async fn transfer(&self, package: &Package, strategy: TransferStrategy) -> Result<(), StorageError>;

    /// Delete everything a previous transfer left at the destination
    async fn remove(&self, entry: &ManifestEntry) -> Result<(), StorageError>;

    /// Packages stored for a trigger, oldest first
    async fn list(&self, trigger: &str) -> Result<Vec<ManifestEntry>, StorageError>;
}

/// Select the backend implementation for a configured kind
pub fn build_backend(config: &StorageConfig, log: Arc<dyn LogSink>) -> Box<dyn StorageBackend> {
    match config.kind {
        StorageKind::Local => Box::new(LocalStorage::new(config.clone(), log)),
    }
}
