//! shelfguard audit - stale database reference detection
//!
//! This crate provides a read-only consistency check of a project tree
//! against the live database schema. It never writes to the tree or the
//! database.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]

pub mod error;
pub mod output;
pub mod rules;
pub mod scan;
pub mod schema;
pub mod types;

pub use error::{AuditError, AuditResult};
pub use rules::{AuditRules, LineMatcher};
pub use scan::Auditor;
pub use types::{AuditFinding, AuditReport, FindingCategory};
