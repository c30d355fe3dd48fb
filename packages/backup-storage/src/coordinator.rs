// Delivers a package to every storage of a run, in order
use crate::cycler::{CycleOutcome, RetentionManager};
use crate::error::TransferError;
use crate::instance::StorageInstance;
use crate::logger::LogSink;
use crate::package::Package;
use crate::storage::TransferStrategy;
use std::sync::Arc;

/// Progress of one storage instance through a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Staged,
    Transferring,
    Transferred,
    TransferFailed,
    Cycling,
    Cycled,
}

/// What happened at one storage
#[derive(Debug)]
pub struct InstanceReport {
    pub storage: String,
    pub strategy: TransferStrategy,
    pub state: InstanceState,
    /// Non-fatal transfer warnings (the copy fallback)
    pub warnings: Vec<TransferError>,
    /// Fatal transfer failure, if any
    pub error: Option<TransferError>,
    /// Retention sweep result; only present once the transfer succeeded
    pub cycle: Option<CycleOutcome>,
}

impl InstanceReport {
    fn transition(&mut self, state: InstanceState) {
        tracing::debug!("{}: {:?} -> {:?}", self.storage, self.state, state);
        self.state = state;
    }
}

/// Outcome of a whole run
#[derive(Debug, Default)]
pub struct RunReport {
    pub instances: Vec<InstanceReport>,
}

impl RunReport {
    /// True when every storage received the package
    pub fn is_success(&self) -> bool {
        self.instances.iter().all(|i| i.error.is_none())
    }

    pub fn fatal_errors(&self) -> impl Iterator<Item = &TransferError> {
        self.instances.iter().filter_map(|i| i.error.as_ref())
    }

    pub fn warning_count(&self) -> usize {
        self.instances
            .iter()
            .map(|i| i.warnings.len() + i.cycle.as_ref().map_or(0, |c| c.failures.len()))
            .sum()
    }
}

pub struct TransferCoordinator {
    log: Arc<dyn LogSink>,
    cycler: RetentionManager,
}

impl TransferCoordinator {
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        Self {
            cycler: RetentionManager::new(log.clone()),
            log,
        }
    }

    /// Store `package` at each instance in order, cycling each destination
    /// after its own transfer succeeds.
    ///
    /// Instances run one after another: the last one moves the staged files,
    /// so nothing may run after or alongside it. A failed instance does not stop
    /// the ones after it; it shows up in the report instead.
    pub async fn run(&self, package: &Package, instances: &[StorageInstance]) -> RunReport {
        let mut report = RunReport::default();

        for instance in instances {
            report.instances.push(self.store(package, instance).await);
        }

        if report.is_success() {
            tracing::info!(
                "Stored '{}' ({}) to {} storage(s)",
                package.label(),
                package.trigger(),
                instances.len()
            );
        }

        report
    }

    async fn store(&self, package: &Package, instance: &StorageInstance) -> InstanceReport {
        let backend = instance.backend();
        let strategy = instance.strategy();
        let mut report = InstanceReport {
            storage: backend.storage_name(),
            strategy,
            state: InstanceState::Staged,
            warnings: Vec::new(),
            error: None,
            cycle: None,
        };

        let destination = backend.remote_path_for(package.id());

        if strategy == TransferStrategy::Copy {
            let warning = TransferError::CopyFallback {
                storage: report.storage.clone(),
                kind: instance.config().kind.to_string(),
                label: package.label().to_string(),
                trigger: package.trigger().to_string(),
                destination: destination.clone(),
            };
            self.log.warn(&warning.to_string());
            report.warnings.push(warning);
        }

        report.transition(InstanceState::Transferring);
        if let Err(source) = backend.transfer(package, strategy).await {
            let err = TransferError::Failed {
                storage: report.storage.clone(),
                label: package.label().to_string(),
                trigger: package.trigger().to_string(),
                destination,
                source,
            };
            self.log.error(&err.to_string());
            report.error = Some(err);
            report.transition(InstanceState::TransferFailed);
            return report;
        }
        report.transition(InstanceState::Transferred);

        report.transition(InstanceState::Cycling);
        report.cycle = Some(self.cycler.cycle(instance, package).await);
        report.transition(InstanceState::Cycled);

        report
    }
}
