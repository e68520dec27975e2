//! Main auditor implementation

use crate::error::{AuditError, AuditResult};
use crate::rules::{AuditRules, LineMatcher};
use crate::schema::check_retired_tables;
use crate::types::{AuditFinding, AuditReport};
use rayon::prelude::*;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Read-only consistency auditor
#[derive(Debug, Clone, Default)]
pub struct Auditor {
    rules: AuditRules,
}

impl Auditor {
    /// Create an auditor with the given rules
    #[must_use]
    pub fn new(rules: AuditRules) -> Self {
        Self { rules }
    }

    /// The rules this auditor applies
    #[must_use]
    pub fn rules(&self) -> &AuditRules {
        &self.rules
    }

    /// Run both passes: the text scan over `project_root`, then the live
    /// schema check against `database`.
    ///
    /// # Errors
    /// Returns an error if the root is not a directory, the walk fails, or
    /// an existing database cannot be opened read-only
    pub fn audit(&self, project_root: &Path, database: &Path) -> AuditResult<AuditReport> {
        let (mut findings, files_scanned) = self.scan_text(project_root)?;

        let display = relative_to(project_root, database);
        let schema = check_retired_tables(database, &display, &self.rules.retired_tables)?;
        let database_checked = schema.is_some();
        if let Some(schema_findings) = schema {
            findings.extend(schema_findings);
        }

        tracing::info!(
            files_scanned,
            findings = findings.len(),
            database_checked,
            "audit complete"
        );

        Ok(AuditReport {
            findings,
            files_scanned,
            database_checked,
        })
    }

    /// Text pass only. Returns sorted findings and the number of files read.
    ///
    /// # Errors
    /// Returns an error if the root is not a directory or the walk fails
    pub fn scan_text(&self, project_root: &Path) -> AuditResult<(Vec<AuditFinding>, usize)> {
        if !project_root.is_dir() {
            return Err(AuditError::InvalidRoot(project_root.display().to_string()));
        }

        let matcher = self.rules.compile()?;
        let excluded_names = self.rules.compile_exclusions()?;
        let files = self.collect_files(project_root, &excluded_names)?;

        let per_file: Vec<Option<Vec<AuditFinding>>> = files
            .par_iter()
            .map(|path| scan_file(&matcher, project_root, path))
            .collect();

        let files_scanned = per_file.iter().filter(|f| f.is_some()).count();
        let mut findings: Vec<AuditFinding> = per_file.into_iter().flatten().flatten().collect();
        findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        Ok((findings, files_scanned))
    }

    fn collect_files(&self, root: &Path, excluded_names: &[Regex]) -> AuditResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e, excluded_names));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let skipped = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| self.rules.is_skipped_extension(ext));
            if skipped {
                tracing::trace!(path = %entry.path().display(), "skipping by extension");
                continue;
            }
            files.push(entry.into_path());
        }

        Ok(files)
    }

    fn is_excluded(&self, entry: &DirEntry, excluded_names: &[Regex]) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let Some(name) = entry.file_name().to_str() else {
            return false;
        };
        if excluded_names.iter().any(|re| re.is_match(name)) {
            tracing::trace!(path = %entry.path().display(), "skipping by name");
            return true;
        }
        entry.file_type().is_dir() && self.rules.is_excluded_dir(name)
    }
}

/// Scan one file. `None` means the file was not text and was skipped.
fn scan_file(matcher: &LineMatcher, root: &Path, path: &Path) -> Option<Vec<AuditFinding>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read file");
            return None;
        }
    };
    let Ok(content) = String::from_utf8(bytes) else {
        tracing::debug!(path = %path.display(), "skipping non-UTF-8 file");
        return None;
    };

    let display = relative_to(root, path);
    let mut findings = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        for category in matcher.check_line(line) {
            findings.push(AuditFinding {
                path: display.clone(),
                line: Some(idx + 1),
                category,
                excerpt: line.trim().to_string(),
            });
        }
    }
    Some(findings)
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}
