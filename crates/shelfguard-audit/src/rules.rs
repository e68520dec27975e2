//! Audit rules and per-line matching
//!
//! Each finding category pairs a trigger with an allow-list of exempting
//! substrings. A line that contains any exemption for a category is never
//! flagged in that category, since history-related lines (migrations,
//! backups, renames) are expected to mention retired names.

use crate::error::{AuditError, AuditResult};
use crate::types::FindingCategory;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Configurable rule set, usually loaded from the `[audit]` config section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditRules {
    /// Canonical database path, relative to the project root
    pub database_path: String,
    /// Exemptions for the stale-path category
    pub path_exemptions: Vec<String>,
    /// Identifiers that were retired (matched as whole words, any case)
    pub retired_identifiers: Vec<String>,
    /// Exemptions for the retired-identifier category
    pub identifier_exemptions: Vec<String>,
    /// Connection-string marker
    pub connection_prefix: String,
    /// Exemptions for the connection-string category
    pub connection_exemptions: Vec<String>,
    /// Tables that must no longer exist in the live schema
    pub retired_tables: Vec<String>,
    /// Directory names skipped during the walk
    pub excluded_dirs: Vec<String>,
    /// File extensions never read
    pub skipped_extensions: Vec<String>,
    /// Regexes over file or directory names skipped during the walk;
    /// the default matches timestamped export artifacts
    pub excluded_name_patterns: Vec<String>,
}

impl Default for AuditRules {
    fn default() -> Self {
        Self {
            database_path: "data/db/reading_list.db".to_string(),
            path_exemptions: strings(&["data/db", "backup", "example"]),
            retired_identifiers: strings(&["readings"]),
            identifier_exemptions: strings(&["rename", "migration", "old", "retired"]),
            connection_prefix: "sqlite:///".to_string(),
            connection_exemptions: strings(&["test", "memory"]),
            retired_tables: strings(&["readings"]),
            excluded_dirs: strings(&[
                ".git",
                ".venv",
                "venv",
                "__pycache__",
                "node_modules",
                "target",
            ]),
            skipped_extensions: strings(&[
                "pyc", "pyo", "pyd", "so", "dll", "dylib", "db", "sqlite", "sqlite3", "png",
                "jpg", "jpeg", "gif", "pdf", "zip",
            ]),
            excluded_name_patterns: strings(&[r"_export_\d{8}_\d{6}"]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl AuditRules {
    /// Compile the rules into a line matcher
    ///
    /// # Errors
    /// Returns an error if a retired identifier cannot be turned into a pattern
    pub fn compile(&self) -> AuditResult<LineMatcher> {
        let identifiers = self
            .retired_identifiers
            .iter()
            .filter(|id| !id.is_empty())
            .map(|id| {
                let pattern = format!(r"\b{}\b", regex::escape(id));
                RegexBuilder::new(&pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| AuditError::InvalidPattern {
                        pattern,
                        message: e.to_string(),
                    })
            })
            .collect::<AuditResult<Vec<Regex>>>()?;

        let normalized = self.database_path.replace('\\', "/");
        let (canonical_dir, file_name) = match normalized.rsplit_once('/') {
            Some((dir, name)) => (format!("{dir}/"), name.to_string()),
            None => (String::new(), normalized.clone()),
        };

        Ok(LineMatcher {
            database_path: normalized,
            canonical_dir,
            file_name,
            identifiers,
            path_exemptions: lowercase(&self.path_exemptions),
            identifier_exemptions: lowercase(&self.identifier_exemptions),
            connection_prefix: self.connection_prefix.clone(),
            connection_exemptions: lowercase(&self.connection_exemptions),
        })
    }

    /// Compile `excluded_name_patterns`
    ///
    /// # Errors
    /// Returns an error if a pattern is not a valid regex
    pub fn compile_exclusions(&self) -> AuditResult<Vec<Regex>> {
        self.excluded_name_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| AuditError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })
            })
            .collect()
    }

    /// Whether a directory name is excluded from the walk
    #[must_use]
    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.excluded_dirs.iter().any(|d| d == name)
    }

    /// Whether a file extension is never read
    #[must_use]
    pub fn is_skipped_extension(&self, ext: &str) -> bool {
        self.skipped_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }
}

fn lowercase(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

/// Compiled form of [`AuditRules`] used for the text pass
#[derive(Debug, Clone)]
pub struct LineMatcher {
    database_path: String,
    canonical_dir: String,
    file_name: String,
    identifiers: Vec<Regex>,
    path_exemptions: Vec<String>,
    identifier_exemptions: Vec<String>,
    connection_prefix: String,
    connection_exemptions: Vec<String>,
}

impl LineMatcher {
    /// Categories a single line should be flagged for, in category order
    #[must_use]
    pub fn check_line(&self, line: &str) -> Vec<FindingCategory> {
        let lower = line.to_lowercase();
        let mut hits = Vec::new();

        if !self.file_name.is_empty()
            && line.contains(&self.file_name)
            && (self.canonical_dir.is_empty() || !line.contains(&self.canonical_dir))
            && !exempt(&lower, &self.path_exemptions)
        {
            hits.push(FindingCategory::StaleDatabasePath);
        }

        if self.identifiers.iter().any(|re| re.is_match(line))
            && !exempt(&lower, &self.identifier_exemptions)
        {
            hits.push(FindingCategory::RetiredIdentifier);
        }

        if !self.connection_prefix.is_empty()
            && line.contains(&self.connection_prefix)
            && !line.contains(&self.database_path)
            && !exempt(&lower, &self.connection_exemptions)
        {
            hits.push(FindingCategory::StaleConnectionString);
        }

        hits
    }
}

fn exempt(lower_line: &str, exemptions: &[String]) -> bool {
    exemptions.iter().any(|e| lower_line.contains(e.as_str()))
}
