//! Format transfer engine
//!
//! Exports the live database as a native copy, a SQL script, or a
//! directory of CSV files, and imports any of the three back. Every write
//! goes to a temporary file next to its destination and is renamed into
//! place only after it has been verified.

mod dump;
mod export;
pub mod format;
mod import;
pub mod manifest;
pub mod progress;
mod tabular;

use thiserror::Error;

pub use format::TransferFormat;
pub use manifest::{TransferDirection, TransferManifest};
pub use progress::TransferProgress;

use crate::config::Settings;

/// Failure inside one transfer step, before it is given a step name
#[derive(Debug, Error)]
pub(crate) enum StepError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Moves data between the live database and export artifacts
#[derive(Debug, Clone, Copy)]
pub struct TransferEngine<'a> {
    settings: &'a Settings,
}

impl<'a> TransferEngine<'a> {
    /// Create an engine for the configured database
    #[must_use]
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }
}
