//! Error taxonomy for storage operations
//!
//! Every failure that happens after a backup was taken carries the backup
//! path, so recovery stays a manual, explicit decision.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during backup, migration and transfer
#[derive(Debug, Error)]
pub enum CoreError {
    /// Source missing or unreadable
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backup copy could not be made or verified
    #[error("Backup of {source_path} failed: {message}")]
    Backup { source_path: PathBuf, message: String },

    /// Alteration failed before commit; the transaction was rolled back
    #[error("Migration '{descriptor}' failed and was rolled back: {message} (backup: {})", .backup.display())]
    Migration {
        descriptor: String,
        message: String,
        backup: PathBuf,
    },

    /// Post-commit verification failed; restore from the backup manually
    #[error("Migration '{descriptor}' committed but failed verification: {message}. Restore manually from {}", .backup.display())]
    Verification {
        descriptor: String,
        message: String,
        backup: PathBuf,
    },

    /// Import source is not one of the supported formats
    #[error("Unsupported import format for {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// Import source failed structural checks; nothing was overwritten
    #[error("Import validation failed for {path}: {reason}")]
    ImportValidation { path: PathBuf, reason: String },

    /// A transfer step failed after it started mutating state
    #[error("Transfer failed during {step}: {message}{}", backup_suffix(.backup.as_deref()))]
    Transfer {
        step: String,
        message: String,
        backup: Option<PathBuf>,
    },

    /// Descriptor would drop or rename existing structure
    #[error("Refusing non-additive change '{descriptor}': {reason}")]
    RefusedChange { descriptor: String, reason: String },

    /// Another exclusive operation holds the lock
    #[error("Another operation is in progress (lock file {}). Remove it if no other process is running", .lock_path.display())]
    Busy { lock_path: PathBuf },

    /// Invalid configuration or argument
    #[error("Configuration error: {0}")]
    Config(String),

    /// SQLite error outside the categories above
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

fn backup_suffix(backup: Option<&Path>) -> String {
    backup.map_or_else(String::new, |p| {
        format!(". Backup of the previous database kept at {}", p.display())
    })
}

impl CoreError {
    /// Get the error code for CLI responses
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "IO_FAILURE",
            Self::Backup { .. } => "BACKUP_FAILURE",
            Self::Migration { .. } => "MIGRATION_FAILURE",
            Self::Verification { .. } => "VERIFICATION_FAILURE",
            Self::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            Self::ImportValidation { .. } => "IMPORT_VALIDATION",
            Self::Transfer { .. } => "TRANSFER_FAILURE",
            Self::RefusedChange { .. } => "REFUSED_CHANGE",
            Self::Busy { .. } => "BUSY",
            Self::Config(_) => "CONFIG",
            Self::Sqlite(_) => "SQLITE",
        }
    }

    /// Backup to restore from, when one was taken before the failure
    #[must_use]
    pub fn backup_path(&self) -> Option<&Path> {
        match self {
            Self::Migration { backup, .. } | Self::Verification { backup, .. } => Some(backup.as_path()),
            Self::Transfer { backup, .. } => backup.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn backup(source_path: &Path, message: impl Into<String>) -> Self {
        Self::Backup {
            source_path: source_path.to_path_buf(),
            message: message.into(),
        }
    }

    pub(crate) fn transfer(
        step: &str,
        message: impl std::fmt::Display,
        backup: Option<&Path>,
    ) -> Self {
        Self::Transfer {
            step: step.to_string(),
            message: message.to_string(),
            backup: backup.map(Path::to_path_buf),
        }
    }
}
