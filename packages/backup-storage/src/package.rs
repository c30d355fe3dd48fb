// Staged backup packages and the manifest entries derived from them
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Timestamp format used for package directories and staged file prefixes
pub const TIME_FORMAT: &str = "%Y.%m.%d.%H.%M.%S";

/// Errors raised while assembling a package
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Package for '{trigger}' has no chunks")]
    Empty { trigger: String },

    #[error("Duplicate chunk destination name '{name}' in package for '{trigger}'")]
    DuplicateDestination { trigger: String, name: String },

    #[error("Chunk source has no file name: {}", .0.display())]
    NoFileName(PathBuf),

    #[error("Invalid package time '{0}' (expected YYYY.MM.DD.HH.MM.SS)")]
    InvalidTime(String),

    #[error("Invalid trigger '{0}': must be a single path component")]
    InvalidTrigger(String),
}

/// Triggers name a directory under each storage root, so they must be one
/// plain path component: not empty, not absolute, no separators or `..`.
pub fn validate_trigger(trigger: &str) -> Result<(), PackageError> {
    let mut components = Path::new(trigger).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == trigger => Ok(()),
        _ => Err(PackageError::InvalidTrigger(trigger.to_string())),
    }
}

/// Identity of a package: the trigger that produced it and when
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageId {
    pub trigger: String,
    pub time: NaiveDateTime,
}

impl PackageId {
    pub fn new(trigger: impl Into<String>, time: NaiveDateTime) -> Self {
        Self {
            trigger: trigger.into(),
            time,
        }
    }

    /// Timestamp rendered the way it appears on disk
    pub fn time_string(&self) -> String {
        self.time.format(TIME_FORMAT).to_string()
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.trigger, self.time_string())
    }
}

/// Parse a package timestamp such as `2011.12.31.11.00.02`
pub fn parse_time(s: &str) -> Result<NaiveDateTime, PackageError> {
    NaiveDateTime::parse_from_str(s, TIME_FORMAT).map_err(|_| PackageError::InvalidTime(s.to_string()))
}

/// One staged file composing a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub source_path: PathBuf,
    pub destination_name: String,
}

impl Chunk {
    pub fn new(source_path: impl Into<PathBuf>, destination_name: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            destination_name: destination_name.into(),
        }
    }

    /// File name of the staged source, as reported in transfer logs
    pub fn source_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_path.display().to_string())
    }
}

/// A staged backup, immutable once built
#[derive(Debug, Clone, Serialize)]
pub struct Package {
    id: PackageId,
    label: String,
    chunks: Vec<Chunk>,
}

impl Package {
    /// Build a package, rejecting bad triggers, empty chunk lists and repeated
    /// destination names
    pub fn new(
        trigger: impl Into<String>,
        label: impl Into<String>,
        time: NaiveDateTime,
        chunks: Vec<Chunk>,
    ) -> Result<Self, PackageError> {
        let id = PackageId::new(trigger, time);
        validate_trigger(&id.trigger)?;

        if chunks.is_empty() {
            return Err(PackageError::Empty { trigger: id.trigger });
        }

        let mut seen = HashSet::new();
        for chunk in &chunks {
            if !seen.insert(chunk.destination_name.as_str()) {
                return Err(PackageError::DuplicateDestination {
                    trigger: id.trigger.clone(),
                    name: chunk.destination_name.clone(),
                });
            }
        }

        Ok(Self {
            id,
            label: label.into(),
            chunks,
        })
    }

    /// Build a package from staged files named `<time>.<name>`.
    ///
    /// The timestamp prefix is stripped to form each destination name; files
    /// without the prefix keep their name unchanged.
    pub fn from_staged_files<P: AsRef<Path>>(
        trigger: impl Into<String>,
        label: impl Into<String>,
        time: NaiveDateTime,
        files: &[P],
    ) -> Result<Self, PackageError> {
        let prefix = format!("{}.", time.format(TIME_FORMAT));

        let chunks = files
            .iter()
            .map(|file| -> Result<Chunk, PackageError> {
                let path = file.as_ref();
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| PackageError::NoFileName(path.to_path_buf()))?;
                let destination = name.strip_prefix(&prefix).unwrap_or(&name).to_string();
                Ok(Chunk::new(path, destination))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(trigger, label, time, chunks)
    }

    pub fn id(&self) -> &PackageId {
        &self.id
    }

    pub fn trigger(&self) -> &str {
        &self.id.trigger
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn time(&self) -> NaiveDateTime {
        self.id.time
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }
}

/// A package previously delivered to a destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: PackageId,
    pub remote_path: PathBuf,
    /// Destination file names, sorted
    pub files: Vec<String>,
}

impl ManifestEntry {
    /// Names the chunks had while staged (`<time>.<file>`), used in removal logs
    pub fn source_names(&self) -> Vec<String> {
        let time = self.id.time_string();
        self.files.iter().map(|f| format!("{}.{}", time, f)).collect()
    }
}
