//! Storage transfer and retention for staged backup packages.
//!
//! A run hands one [`Package`] to every configured storage in order. Every
//! storage but the last copies the staged chunks; the last one moves them.
//! After each successful transfer the destination is cycled down to its
//! configured `keep` count.

pub mod coordinator;
pub mod cycler;
pub mod error;
pub mod instance;
pub mod logger;
pub mod package;
pub mod storage;

pub use coordinator::{InstanceReport, InstanceState, RunReport, TransferCoordinator};
pub use cycler::{CycleOutcome, RetentionManager};
pub use error::{RemovalError, StorageError, TransferError};
pub use instance::{instances_for, StorageInstance};
pub use logger::{CapturedLog, LogSink, TracingSink};
pub use package::{Chunk, ManifestEntry, Package, PackageError, PackageId};
pub use storage::{StorageBackend, StorageConfig, StorageKind, TransferStrategy};
