// Error types for storage transfer and cycling
use std::io;
use std::path::PathBuf;

/// Backend-level failure, carrying the path that was being touched
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to {action} {} to {}: {source}", .from.display(), .to.display())]
    Place {
        action: &'static str,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to remove {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to list {}: {source}", .path.display())]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome classes of a transfer to one storage
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Expected downgrade from move to copy; the run continues
    #[error(
        "{storage}::TransferError: File Copy Warning!\n  \
         The final backup file(s) for '{label}' ({trigger})\n  \
         will be *copied* to '{}'\n  \
         To avoid this, when using more than one Storage, the '{kind}' Storage\n  \
         should be added *last* so the files may be *moved* to their destination.",
        .destination.display()
    )]
    CopyFallback {
        storage: String,
        kind: String,
        label: String,
        trigger: String,
        destination: PathBuf,
    },

    /// Chunks could not be placed at the destination
    #[error(
        "{storage}::TransferError: Transfer Failed!\n  \
         The backup file(s) for '{label}' ({trigger})\n  \
         could not be stored to '{}'\n  \
         Reason: {source}",
        .destination.display()
    )]
    Failed {
        storage: String,
        label: String,
        trigger: String,
        destination: PathBuf,
        #[source]
        source: StorageError,
    },
}

impl TransferError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransferError::Failed { .. })
    }
}

/// A retention sweep could not list or delete old backups
#[derive(Debug, thiserror::Error)]
pub enum RemovalError {
    #[error(
        "{storage}::RemovePackageError: Cycler Warning!\n  \
         There was a problem removing the following package for '{label}' ({trigger})\n  \
         Dated: {time} at '{}'\n  \
         Reason: {source}",
        .destination.display()
    )]
    Remove {
        storage: String,
        label: String,
        trigger: String,
        time: String,
        destination: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error(
        "{storage}::CyclerError: Cycler Warning!\n  \
         Could not list stored backups for '{label}' ({trigger}) at '{}'\n  \
         Reason: {source}",
        .destination.display()
    )]
    List {
        storage: String,
        label: String,
        trigger: String,
        destination: PathBuf,
        #[source]
        source: StorageError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_fallback_message() {
        let err = TransferError::CopyFallback {
            storage: "Storage::Local".to_string(),
            kind: "Local".to_string(),
            label: "test label".to_string(),
            trigger: "test_trigger".to_string(),
            destination: PathBuf::from("remote_path"),
        };

        assert_eq!(
            err.to_string(),
            "Storage::Local::TransferError: File Copy Warning!\n  \
             The final backup file(s) for 'test label' (test_trigger)\n  \
             will be *copied* to 'remote_path'\n  \
             To avoid this, when using more than one Storage, the 'Local' Storage\n  \
             should be added *last* so the files may be *moved* to their destination."
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_failed_is_fatal_and_names_destination() {
        let err = TransferError::Failed {
            storage: "Storage::Local".to_string(),
            label: "label".to_string(),
            trigger: "trigger".to_string(),
            destination: PathBuf::from("/backups/trigger/2011.12.31.11.00.02"),
            source: StorageError::CreateDir {
                path: PathBuf::from("/backups/trigger"),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            },
        };

        assert!(err.is_fatal());
        let text = err.to_string();
        assert!(text.contains("'label' (trigger)"));
        assert!(text.contains("/backups/trigger/2011.12.31.11.00.02"));
    }

    #[test]
    fn test_removal_message_names_package() {
        let err = RemovalError::Remove {
            storage: "Storage::Local".to_string(),
            label: "label".to_string(),
            trigger: "trigger".to_string(),
            time: "2011.12.31.11.00.02".to_string(),
            destination: PathBuf::from("/backups/trigger/2011.12.31.11.00.02"),
            source: StorageError::Remove {
                path: PathBuf::from("/backups/trigger/2011.12.31.11.00.02"),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            },
        };

        let text = err.to_string();
        assert!(text.starts_with("Storage::Local::RemovePackageError: Cycler Warning!"));
        assert!(text.contains("'label' (trigger)"));
        assert!(text.contains("Dated: 2011.12.31.11.00.02 at '/backups/trigger/2011.12.31.11.00.02'"));
    }
}
