//! JSON output formatter

use crate::error::AuditResult;
use crate::types::AuditReport;

/// Convert an audit report to a JSON string
///
/// # Errors
/// Returns an error if serialization fails
pub fn to_json(report: &AuditReport) -> AuditResult<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
