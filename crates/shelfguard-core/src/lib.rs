//! shelfguard core - backups, schema migration and format transfer
//!
//! This crate owns every write to the live reading-list database: verified
//! backups, additive schema migrations, and export/import in native,
//! SQL script and CSV form.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backup;
pub mod config;
pub mod error;
pub mod migrate;
pub mod storage;
pub mod transfer;
pub mod util;

pub use shelfguard_audit;

pub use backup::{BackupManager, BackupRecord};
pub use config::Settings;
pub use error::{CoreError, CoreResult};
pub use migrate::{Descriptor, MigrationResult, MigrationState, Migrator, SchemaChange};
pub use storage::Session;
pub use transfer::{TransferEngine, TransferFormat, TransferManifest, TransferProgress};
