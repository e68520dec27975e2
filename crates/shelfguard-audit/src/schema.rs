//! Live schema introspection
//!
//! Opens the database strictly read-only; nothing here can create or
//! modify the file.

use crate::error::{AuditError, AuditResult};
use crate::types::{AuditFinding, FindingCategory};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

/// Check the live database for retired tables.
///
/// Returns `Ok(None)` when the database file does not exist.
///
/// # Errors
/// Returns an error if the database exists but cannot be opened or queried
pub fn check_retired_tables(
    db_path: &Path,
    display_path: &Path,
    retired_tables: &[String],
) -> AuditResult<Option<Vec<AuditFinding>>> {
    if !db_path.is_file() {
        tracing::warn!(path = %db_path.display(), "database file not found, skipping schema check");
        return Ok(None);
    }

    let db_err = |source| AuditError::Database {
        path: db_path.to_path_buf(),
        source,
    };

    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(db_err)?;

    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .map_err(db_err)?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(db_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)?;

    let findings = retired_tables
        .iter()
        .filter(|retired| tables.iter().any(|t| t.eq_ignore_ascii_case(retired)))
        .map(|retired| AuditFinding {
            path: display_path.to_path_buf(),
            line: None,
            category: FindingCategory::RetiredTable,
            excerpt: format!("table '{retired}' still exists"),
        })
        .collect();

    Ok(Some(findings))
}
