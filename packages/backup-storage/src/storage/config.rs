// Storage configuration management
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "BACKUP_STORAGE_CONFIG";

/// Backend kinds that can be configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "Local",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No storages configured")]
    NoStorages,

    #[error("Storage::{kind} is configured more than once with storage_id {storage_id:?}; set a distinct storage_id")]
    DuplicateStorage {
        kind: StorageKind,
        storage_id: Option<String>,
    },

    #[error("Cannot expand path {}: home directory is unknown", .0.display())]
    NoHome(PathBuf),
}

/// One resolved storage destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub kind: StorageKind,

    /// Root of the destination; packages land in `<path>/<trigger>/<time>`
    pub path: PathBuf,

    /// Distinguishes several storages of the same kind
    pub storage_id: Option<String>,

    /// Number of backups to retain; `None` keeps everything
    pub keep: Option<usize>,
}

impl StorageConfig {
    pub fn new(kind: StorageKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            storage_id: None,
            keep: None,
        }
    }

    pub fn with_storage_id(mut self, storage_id: impl Into<String>) -> Self {
        self.storage_id = Some(storage_id.into());
        self
    }

    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = Some(keep);
        self
    }

    /// Display name used in log messages, e.g. `Storage::Local (primary)`
    pub fn storage_name(&self) -> String {
        match &self.storage_id {
            Some(id) => format!("Storage::{} ({})", self.kind, id),
            None => format!("Storage::{}", self.kind),
        }
    }
}

/// Per-kind defaults, `[defaults.<kind>]` in the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<usize>,
}

/// A `[[storage]]` table as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSection {
    pub kind: StorageKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<usize>,
}

/// Run configuration: the ordered storages for a backup model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub defaults: BTreeMap<StorageKind, StorageDefaults>,

    #[serde(default, rename = "storage")]
    pub storages: Vec<StorageSection>,
}

impl RunConfig {
    /// Load configuration with the following priority:
    /// 1. Explicit path
    /// 2. BACKUP_STORAGE_CONFIG environment variable
    /// 3. ~/.config/backup-storage/config.toml
    /// 4. Default: one local storage at ~/backups
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path).await;
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            return Self::from_file(Path::new(&env_path)).await;
        }

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                return Self::from_file(&config_path).await;
            }
        }

        Ok(Self::default())
    }

    /// Read and parse a TOML config file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the config file path (~/.config/backup-storage/config.toml)
    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("backup-storage").join("config.toml"))
    }

    /// Resolve every storage against the defaults, in configured order
    pub fn storages(&self) -> Result<Vec<StorageConfig>, ConfigError> {
        if self.storages.is_empty() {
            return Err(ConfigError::NoStorages);
        }

        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(self.storages.len());

        for section in &self.storages {
            if !seen.insert((section.kind, section.storage_id.clone())) {
                return Err(ConfigError::DuplicateStorage {
                    kind: section.kind,
                    storage_id: section.storage_id.clone(),
                });
            }

            let defaults = self.defaults.get(&section.kind);
            let path = match section.path.as_ref().or(defaults.and_then(|d| d.path.as_ref())) {
                Some(path) => expand_path(path)?,
                None => default_storage_path()?,
            };
            let keep = section.keep.or(defaults.and_then(|d| d.keep));

            resolved.push(StorageConfig {
                kind: section.kind,
                path,
                storage_id: section.storage_id.clone(),
                keep,
            });
        }

        Ok(resolved)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            defaults: BTreeMap::new(),
            storages: vec![StorageSection {
                kind: StorageKind::Local,
                storage_id: None,
                path: None,
                keep: None,
            }],
        }
    }
}

fn default_storage_path() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join("backups"))
        .ok_or_else(|| ConfigError::NoHome(PathBuf::from("~/backups")))
}

/// Expand a leading `~` and make relative paths absolute
pub fn expand_path(path: &Path) -> Result<PathBuf, ConfigError> {
    if let Ok(rest) = path.strip_prefix("~") {
        let home = dirs::home_dir().ok_or_else(|| ConfigError::NoHome(path.to_path_buf()))?;
        return Ok(home.join(rest));
    }

    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    Ok(std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf()))
}
