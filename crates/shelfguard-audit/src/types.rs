//! Shared types for the auditor

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of stale reference a finding describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    /// A literal database path outside the canonical location
    StaleDatabasePath,
    /// A retired table/column identifier still referenced in text
    RetiredIdentifier,
    /// A connection string not pointing at the canonical database
    StaleConnectionString,
    /// A retired table still present in the live schema
    RetiredTable,
}

impl FindingCategory {
    /// Human-readable label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::StaleDatabasePath => "Incorrect database path",
            Self::RetiredIdentifier => "Reference to retired identifier",
            Self::StaleConnectionString => "Incorrect SQLite connection string",
            Self::RetiredTable => "Retired table still present in database",
        }
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single advisory finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFinding {
    /// File the finding refers to, relative to the project root
    pub path: PathBuf,
    /// 1-based line number; `None` for schema findings
    pub line: Option<usize>,
    /// What kind of stale reference this is
    pub category: FindingCategory,
    /// The trimmed offending line, or a schema description
    pub excerpt: String,
}

impl AuditFinding {
    /// Sort key giving a stable output order
    pub(crate) fn sort_key(&self) -> (&PathBuf, Option<usize>, FindingCategory) {
        (&self.path, self.line, self.category)
    }
}

/// Result of a full audit run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditReport {
    /// Text findings first (sorted), then schema findings
    pub findings: Vec<AuditFinding>,
    /// Number of text files inspected
    pub files_scanned: usize,
    /// Whether the live database was found and introspected
    pub database_checked: bool,
}

impl AuditReport {
    /// True when at least one finding exists
    #[must_use]
    pub fn has_findings(&self) -> bool {
        !self.findings.is_empty()
    }

    /// Findings in a given category
    pub fn in_category(&self, category: FindingCategory) -> impl Iterator<Item = &AuditFinding> {
        self.findings.iter().filter(move |f| f.category == category)
    }
}
