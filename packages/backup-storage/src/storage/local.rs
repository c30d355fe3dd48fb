// Local filesystem storage backend
use super::{StorageBackend, StorageConfig, StorageKind, TransferStrategy};
use crate::error::StorageError;
use crate::logger::LogSink;
use crate::package::{parse_time, ManifestEntry, Package, PackageId, TIME_FORMAT};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Local filesystem storage backend
///
/// Stores each package in its own directory: `{root}/{trigger}/{time}/{chunk}`.
/// Listing that tree is what drives retention; there is no separate index.
pub struct LocalStorage {
    config: StorageConfig,
    log: Arc<dyn LogSink>,
}

impl LocalStorage {
    /// Create a new LocalStorage instance with the given configuration
    pub fn new(config: StorageConfig, log: Arc<dyn LogSink>) -> Self {
        Self { config, log }
    }

    /// Create a new LocalStorage instance from a root path
    pub fn with_root<P: AsRef<Path>>(root: P, log: Arc<dyn LogSink>) -> Self {
        Self::new(StorageConfig::new(StorageKind::Local, root.as_ref()), log)
    }

    /// Get the root directory for storage
    pub fn root(&self) -> &Path {
        &self.config.path
    }

    fn trigger_path(&self, trigger: &str) -> PathBuf {
        self.config.path.join(trigger)
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn storage_name(&self) -> String {
        self.config.storage_name()
    }

    fn remote_path_for(&self, id: &PackageId) -> PathBuf {
        self.trigger_path(&id.trigger).join(id.time_string())
    }

    async fn transfer(&self, package: &Package, strategy: TransferStrategy) -> Result<(), StorageError> {
        let remote_path = self.remote_path_for(package.id());

        fs::create_dir_all(&remote_path)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: remote_path.clone(),
                source,
            })?;

        let name = self.storage_name();
        for chunk in package.chunks() {
            self.log
                .message(&format!("{} started transferring '{}'.", name, chunk.source_name()));

            let destination = remote_path.join(&chunk.destination_name);
            match strategy {
                TransferStrategy::Move => move_file(&chunk.source_path, &destination).await?,
                TransferStrategy::Copy => copy_file(&chunk.source_path, &destination).await?,
            }
        }

        Ok(())
    }

    async fn remove(&self, entry: &ManifestEntry) -> Result<(), StorageError> {
        let remote_path = self.remote_path_for(&entry.id);

        let name = self.storage_name();
        let lines: Vec<String> = entry
            .source_names()
            .iter()
            .map(|source| format!("{} started removing '{}'.", name, source))
            .collect();
        if !lines.is_empty() {
            self.log.message(&lines.join("\n"));
        }

        match fs::remove_dir_all(&remote_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("Already removed: {}", remote_path.display());
                Ok(())
            }
            Err(source) => Err(StorageError::Remove {
                path: remote_path,
                source,
            }),
        }
    }

    async fn list(&self, trigger: &str) -> Result<Vec<ManifestEntry>, StorageError> {
        let trigger_path = self.trigger_path(trigger);

        let mut dir = match fs::read_dir(&trigger_path).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StorageError::List {
                    path: trigger_path,
                    source,
                })
            }
        };

        let list_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StorageError::List { path, source }
        };

        let mut entries = Vec::new();
        while let Some(item) = dir.next_entry().await.map_err(list_err(&trigger_path))? {
            let path = item.path();
            // Names must round-trip through `remote_path_for`
            let Some(time) = item
                .file_name()
                .to_str()
                .and_then(|n| parse_time(n).ok().filter(|t| t.format(TIME_FORMAT).to_string() == n))
            else {
                tracing::debug!("Skipping unrecognised entry: {}", path.display());
                continue;
            };
            if !item.file_type().await.map_err(list_err(&path))?.is_dir() {
                continue;
            }

            let mut files = Vec::new();
            let mut package_dir = fs::read_dir(&path).await.map_err(list_err(&path))?;
            while let Some(file) = package_dir.next_entry().await.map_err(list_err(&path))? {
                files.push(file.file_name().to_string_lossy().into_owned());
            }
            files.sort();

            entries.push(ManifestEntry {
                id: PackageId::new(trigger, time),
                remote_path: path,
                files,
            });
        }

        entries.sort_by(|a, b| a.id.time.cmp(&b.id.time));
        Ok(entries)
    }
}

async fn copy_file(from: &Path, to: &Path) -> Result<(), StorageError> {
    fs::copy(from, to)
        .await
        .map(|_| ())
        .map_err(|source| StorageError::Place {
            action: "copy",
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        })
}

/// Rename into place, falling back to copy-then-delete across filesystems
async fn move_file(from: &Path, to: &Path) -> Result<(), StorageError> {
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }

    let place_err = |source| StorageError::Place {
        action: "move",
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    fs::copy(from, to).await.map_err(place_err)?;
    fs::remove_file(from).await.map_err(place_err)?;
    Ok(())
}
