// Retention: keep only the newest `keep` backups at a destination
use crate::error::RemovalError;
use crate::instance::StorageInstance;
use crate::logger::LogSink;
use crate::package::{ManifestEntry, Package};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of one retention sweep
#[derive(Debug, Default)]
pub struct CycleOutcome {
    /// Entries deleted, oldest first
    pub removed: Vec<ManifestEntry>,
    /// Problems reported as warnings
    pub failures: Vec<RemovalError>,
}

impl CycleOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Container holding every package of a trigger: the parent of a package's address
fn trigger_address(remote_path: &Path) -> PathBuf {
    remote_path.parent().unwrap_or(remote_path).to_path_buf()
}

pub struct RetentionManager {
    log: Arc<dyn LogSink>,
}

impl RetentionManager {
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        Self { log }
    }

    /// Sweep the instance's destination after `package` was delivered there.
    ///
    /// Removes the oldest `count - keep` stored packages for the trigger. Does
    /// nothing when `keep` is unset. Failures are logged as warnings and returned
    /// in the outcome; they never fail the transfer that preceded the sweep.
    pub async fn cycle(&self, instance: &StorageInstance, package: &Package) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();

        let Some(keep) = instance.keep() else {
            return outcome;
        };

        let backend = instance.backend();
        let storage = backend.storage_name();

        let entries = match backend.list(package.trigger()).await {
            Ok(entries) => entries,
            Err(source) => {
                let err = RemovalError::List {
                    storage,
                    label: package.label().to_string(),
                    trigger: package.trigger().to_string(),
                    destination: trigger_address(&backend.remote_path_for(package.id())),
                    source,
                };
                self.log.warn(&err.to_string());
                outcome.failures.push(err);
                return outcome;
            }
        };

        let excess = entries.len().saturating_sub(keep);
        if excess == 0 {
            tracing::debug!("{}: {} stored, keeping {}", storage, entries.len(), keep);
            return outcome;
        }

        tracing::info!(
            "{}: cycling {} of {} stored backups for '{}' (keep {})",
            storage,
            excess,
            entries.len(),
            package.trigger(),
            keep
        );

        for entry in entries.into_iter().take(excess) {
            match backend.remove(&entry).await {
                Ok(()) => {
                    tracing::info!("{}: removed backup {}", storage, entry.id);
                    outcome.removed.push(entry);
                }
                Err(source) => {
                    let err = RemovalError::Remove {
                        storage: storage.clone(),
                        label: package.label().to_string(),
                        trigger: entry.id.trigger.clone(),
                        time: entry.id.time_string(),
                        destination: entry.remote_path.clone(),
                        source,
                    };
                    self.log.warn(&err.to_string());
                    outcome.failures.push(err);
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::CapturedLog;
    use crate::package::{parse_time, Chunk};
    use crate::storage::{LocalStorage, StorageConfig, StorageKind, TransferStrategy};
    use crate::storage::StorageBackend;
    use tempfile::TempDir;
    use tokio::fs;

    const TIMES: [&str; 4] = [
        "2011.01.01.00.00.00",
        "2011.02.01.00.00.00",
        "2011.03.01.00.00.00",
        "2011.04.01.00.00.00",
    ];

    async fn seeded(keep: Option<usize>) -> (TempDir, StorageInstance, Package, CapturedLog) {
        let temp = TempDir::new().unwrap();
        let log = CapturedLog::new();
        let mut config = StorageConfig::new(StorageKind::Local, temp.path().join("backups"));
        config.keep = keep;

        let backend = LocalStorage::new(config.clone(), Arc::new(log.clone()));
        let staging = temp.path().join("staging");
        fs::create_dir_all(&staging).await.unwrap();

        let mut last = None;
        for time in TIMES {
            let source = staging.join(format!("{}.backup.tar", time));
            fs::write(&source, b"data").await.unwrap();
            let package = Package::new(
                "test_trigger",
                "test label",
                parse_time(time).unwrap(),
                vec![Chunk::new(source, "backup.tar")],
            )
            .unwrap();
            backend.transfer(&package, TransferStrategy::Move).await.unwrap();
            last = Some(package);
        }

        let instance = StorageInstance::new(config, Box::new(backend), 0, 1);
        (temp, instance, last.unwrap(), log)
    }

    fn stored(instance: &StorageInstance) -> Vec<String> {
        let root = instance.config().path.join("test_trigger");
        let mut names: Vec<String> = std::fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_keep_unset_removes_nothing() {
        let (_temp, instance, package, _log) = seeded(None).await;
        let manager = RetentionManager::new(Arc::new(CapturedLog::new()));

        let outcome = manager.cycle(&instance, &package).await;

        assert!(outcome.removed.is_empty());
        assert_eq!(stored(&instance).len(), 4);
    }

    #[tokio::test]
    async fn test_removes_oldest_beyond_keep() {
        let (_temp, instance, package, log) = seeded(Some(2)).await;
        let manager = RetentionManager::new(Arc::new(log.clone()));

        let outcome = manager.cycle(&instance, &package).await;

        assert!(outcome.is_clean());
        let removed: Vec<_> = outcome.removed.iter().map(|e| e.id.time_string()).collect();
        assert_eq!(removed, [TIMES[0], TIMES[1]]);
        assert_eq!(stored(&instance), [TIMES[2], TIMES[3]]);

        let removals: Vec<_> = log
            .messages()
            .into_iter()
            .filter(|m| m.contains("started removing"))
            .collect();
        assert_eq!(
            removals,
            [
                "Storage::Local started removing '2011.01.01.00.00.00.backup.tar'.",
                "Storage::Local started removing '2011.02.01.00.00.00.backup.tar'.",
            ]
        );
    }

    #[tokio::test]
    async fn test_count_within_keep_removes_nothing() {
        let (_temp, instance, package, _log) = seeded(Some(4)).await;
        let manager = RetentionManager::new(Arc::new(CapturedLog::new()));

        let outcome = manager.cycle(&instance, &package).await;

        assert!(outcome.removed.is_empty());
        assert_eq!(stored(&instance).len(), 4);
    }

    #[tokio::test]
    async fn test_keep_zero_removes_everything() {
        let (_temp, instance, package, _log) = seeded(Some(0)).await;
        let manager = RetentionManager::new(Arc::new(CapturedLog::new()));

        let outcome = manager.cycle(&instance, &package).await;

        assert_eq!(outcome.removed.len(), 4);
        assert!(stored(&instance).is_empty());
    }

    struct StuckBackend;

    #[async_trait::async_trait]
    impl StorageBackend for StuckBackend {
        fn storage_name(&self) -> String {
            "Storage::Stuck".to_string()
        }

        fn remote_path_for(&self, id: &crate::package::PackageId) -> std::path::PathBuf {
            std::path::PathBuf::from("/stuck").join(&id.trigger).join(id.time_string())
        }

        async fn transfer(&self, _: &Package, _: TransferStrategy) -> Result<(), crate::error::StorageError> {
            Ok(())
        }

        async fn remove(&self, entry: &ManifestEntry) -> Result<(), crate::error::StorageError> {
            Err(crate::error::StorageError::Remove {
                path: entry.remote_path.clone(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            })
        }

        async fn list(&self, trigger: &str) -> Result<Vec<ManifestEntry>, crate::error::StorageError> {
            Ok(TIMES
                .iter()
                .map(|t| {
                    let id = crate::package::PackageId::new(trigger, parse_time(t).unwrap());
                    ManifestEntry {
                        remote_path: self.remote_path_for(&id),
                        id,
                        files: vec!["backup.tar".to_string()],
                    }
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_removal_failure_is_warning() {
        let log = CapturedLog::new();
        let config = StorageConfig::new(StorageKind::Local, "/stuck").with_keep(1);
        let instance = StorageInstance::new(config, Box::new(StuckBackend), 0, 1);
        let package = Package::new(
            "test_trigger",
            "test label",
            parse_time(TIMES[3]).unwrap(),
            vec![Chunk::new("/staging/backup.tar", "backup.tar")],
        )
        .unwrap();

        let outcome = RetentionManager::new(Arc::new(log.clone())).cycle(&instance, &package).await;

        assert!(outcome.removed.is_empty());
        assert_eq!(outcome.failures.len(), 3);
        let warnings = log.warnings();
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("'test label' (test_trigger)"));
        assert!(warnings[0].contains("/stuck/test_trigger/2011.01.01.00.00.00"));
    }

    /// Backend whose listing always fails, rooted away from the configured path
    struct UnlistableBackend;

    #[async_trait::async_trait]
    impl StorageBackend for UnlistableBackend {
        fn storage_name(&self) -> String {
            "Storage::Unlistable".to_string()
        }

        fn remote_path_for(&self, id: &crate::package::PackageId) -> std::path::PathBuf {
            std::path::PathBuf::from("/bucket/prefix").join(&id.trigger).join(id.time_string())
        }

        async fn transfer(&self, _: &Package, _: TransferStrategy) -> Result<(), crate::error::StorageError> {
            Ok(())
        }

        async fn remove(&self, _: &ManifestEntry) -> Result<(), crate::error::StorageError> {
            Ok(())
        }

        async fn list(&self, trigger: &str) -> Result<Vec<ManifestEntry>, crate::error::StorageError> {
            Err(crate::error::StorageError::List {
                path: std::path::PathBuf::from("/bucket/prefix").join(trigger),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            })
        }
    }

    #[tokio::test]
    async fn test_list_failure_names_backend_address() {
        let log = CapturedLog::new();
        let config = StorageConfig::new(StorageKind::Local, "/configured/elsewhere").with_keep(1);
        let instance = StorageInstance::new(config, Box::new(UnlistableBackend), 0, 1);
        let package = Package::new(
            "test_trigger",
            "test label",
            parse_time(TIMES[0]).unwrap(),
            vec![Chunk::new("/staging/backup.tar", "backup.tar")],
        )
        .unwrap();

        let outcome = RetentionManager::new(Arc::new(log.clone())).cycle(&instance, &package).await;

        assert!(outcome.removed.is_empty());
        assert!(matches!(
            &outcome.failures[..],
            [RemovalError::List { destination, .. }] if destination == Path::new("/bucket/prefix/test_trigger")
        ));
        let warnings = log.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("'/bucket/prefix/test_trigger'"));
        assert!(!warnings[0].contains("/configured/elsewhere"));
    }
}
