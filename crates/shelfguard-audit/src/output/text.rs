//! Plain-text output formatter

use crate::types::{AuditFinding, AuditReport};
use std::fmt::Write;
use std::path::PathBuf;

/// Render a report grouped by file, in finding order
#[must_use]
pub fn to_text(report: &AuditReport) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "Scanned {} files for database path and table name inconsistencies",
        report.files_scanned
    );
    if !report.database_checked {
        output.push_str("Database file not found; schema check skipped\n");
    }

    let mut current: Option<&PathBuf> = None;
    for finding in &report.findings {
        if current != Some(&finding.path) {
            let _ = writeln!(output, "\nFile: {}", finding.path.display());
            current = Some(&finding.path);
        }
        write_finding(&mut output, finding);
    }

    output.push('\n');
    if report.has_findings() {
        let _ = writeln!(output, "{} issue(s) found", report.findings.len());
    } else {
        output.push_str("No inconsistencies found\n");
    }
    output
}

fn write_finding(output: &mut String, finding: &AuditFinding) {
    match finding.line {
        Some(line) => {
            let _ = writeln!(output, "  Line {line}: {}", finding.category);
            let _ = writeln!(output, "    {}", finding.excerpt);
        }
        None => {
            let _ = writeln!(output, "  Schema: {} ({})", finding.category, finding.excerpt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FindingCategory;

    #[test]
    fn test_empty_report() {
        let report = AuditReport {
            findings: Vec::new(),
            files_scanned: 3,
            database_checked: true,
        };
        let text = to_text(&report);
        assert!(text.contains("Scanned 3 files"));
        assert!(text.contains("No inconsistencies found"));
    }

    #[test]
    fn test_findings_grouped_by_file() {
        let finding = |line| AuditFinding {
            path: PathBuf::from("src/app.py"),
            line: Some(line),
            category: FindingCategory::RetiredIdentifier,
            excerpt: "FROM readings".to_string(),
        };
        let report = AuditReport {
            findings: vec![finding(2), finding(9)],
            files_scanned: 1,
            database_checked: false,
        };
        let text = to_text(&report);
        assert_eq!(text.matches("File: src/app.py").count(), 1);
        assert!(text.contains("Line 9: Reference to retired identifier"));
        assert!(text.contains("schema check skipped"));
        assert!(text.contains("2 issue(s) found"));
    }
}
