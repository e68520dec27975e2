//! Error types for the consistency auditor

use std::path::PathBuf;
use thiserror::Error;

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;

/// Errors that stop an audit from completing.
///
/// Findings are not errors; they are returned as data in the report.
#[derive(Error, Debug)]
pub enum AuditError {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize the report
    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),

    /// Project root missing or not a directory
    #[error("Invalid project root: {0}")]
    InvalidRoot(String),

    /// Directory walk failed
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// A rule pattern could not be compiled
    #[error("Invalid rule pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The live database could not be opened or queried
    #[error("Database error for {path}: {source}")]
    Database {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
}
