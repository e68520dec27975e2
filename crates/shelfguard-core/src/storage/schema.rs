//! Schema introspection helpers
//!
//! All functions here are read-only.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::util::quote_identifier;

/// One `sqlite_master` entry with its DDL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaEntry {
    /// `table`, `index`, `trigger` or `view`
    pub kind: String,
    pub name: String,
    pub table: String,
    pub sql: String,
}

/// How a table is stored, as reported by `PRAGMA table_list`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Ordinary,
    /// Backed by a module such as fts5
    Virtual,
    /// Owned by a virtual table and recreated with it
    Shadow,
}

/// Every table in the main schema with its kind, sorted by name
/// (internal `sqlite_` tables excluded)
///
/// # Errors
/// Returns an error if the schema cannot be queried
pub fn table_kinds(conn: &Connection) -> rusqlite::Result<Vec<(String, TableKind)>> {
    let mut stmt = conn.prepare("PRAGMA main.table_list")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>("name")?, row.get::<_, String>("type")?))
    })?;

    let mut tables = Vec::new();
    for row in rows {
        let (name, kind) = row?;
        if name.starts_with("sqlite_") {
            continue;
        }
        let kind = match kind.as_str() {
            "table" => TableKind::Ordinary,
            "virtual" => TableKind::Virtual,
            "shadow" => TableKind::Shadow,
            _ => continue,
        };
        tables.push((name, kind));
    }
    tables.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(tables)
}

/// User tables, sorted by name. Internal `sqlite_` tables and the shadow
/// tables of virtual tables are excluded.
///
/// # Errors
/// Returns an error if the schema cannot be queried
pub fn list_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    Ok(table_kinds(conn)?
        .into_iter()
        .filter(|(_, kind)| *kind != TableKind::Shadow)
        .map(|(name, _)| name)
        .collect())
}

/// Whether a table exists (case-insensitive, as SQLite resolves names)
///
/// # Errors
/// Returns an error if the schema cannot be queried
pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Column names of a table in declaration order; empty if the table is absent
///
/// # Errors
/// Returns an error if the schema cannot be queried
pub fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let rows = stmt.query_map(params![table], |row| row.get(0))?;
    rows.collect()
}

/// Whether a table has a column (case-insensitive)
///
/// # Errors
/// Returns an error if the schema cannot be queried
pub fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    Ok(table_columns(conn, table)?
        .iter()
        .any(|c| c.eq_ignore_ascii_case(column)))
}

/// Number of rows in a table
///
/// # Errors
/// Returns an error if the table cannot be queried
pub fn row_count(conn: &Connection, table: &str) -> rusqlite::Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Number of rows where `column` is NULL
///
/// # Errors
/// Returns an error if the table cannot be queried
pub fn null_count(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<u64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} IS NULL",
        quote_identifier(table),
        quote_identifier(column)
    );
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Run `PRAGMA quick_check`. Returns `None` when the database is intact,
/// otherwise the first problem reported.
///
/// # Errors
/// Returns an error if the check itself cannot run (e.g. not a database)
pub fn quick_check(conn: &Connection) -> rusqlite::Result<Option<String>> {
    let result: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    Ok(if result.eq_ignore_ascii_case("ok") {
        None
    } else {
        Some(result)
    })
}

/// Every schema object that has DDL, ordered by kind then name.
/// Two databases with equal snapshots are schema-equivalent.
///
/// # Errors
/// Returns an error if the schema cannot be queried
pub fn schema_snapshot(conn: &Connection) -> rusqlite::Result<Vec<SchemaEntry>> {
    let mut stmt = conn.prepare(
        r"
        SELECT type, name, tbl_name, sql FROM sqlite_master
        WHERE sql IS NOT NULL AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
        ORDER BY type, name
        ",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(SchemaEntry {
            kind: row.get(0)?,
            name: row.get(1)?,
            table: row.get(2)?,
            sql: row.get(3)?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r"
            CREATE TABLE read (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT, media TEXT);
            CREATE INDEX idx_read_media ON read(media);
            INSERT INTO read (title, media) VALUES ('Dune', NULL), ('Emma', 'kindle');
            ",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_list_tables_excludes_internal() {
        let conn = sample();
        assert_eq!(list_tables(&conn).unwrap(), vec!["read".to_string()]);
    }

    #[test]
    fn test_table_kinds_mark_virtual_and_shadow() {
        let conn = sample();
        conn.execute_batch("CREATE VIRTUAL TABLE notes USING fts5(body);")
            .unwrap();

        let kinds = table_kinds(&conn).unwrap();
        assert!(kinds.contains(&("notes".to_string(), TableKind::Virtual)));
        assert!(kinds.contains(&("notes_config".to_string(), TableKind::Shadow)));
        assert!(kinds.contains(&("read".to_string(), TableKind::Ordinary)));
        assert_eq!(list_tables(&conn).unwrap(), vec!["notes", "read"]);
    }

    #[test]
    fn test_columns_and_counts() {
        let conn = sample();
        assert_eq!(table_columns(&conn, "read").unwrap(), vec!["id", "title", "media"]);
        assert!(has_column(&conn, "read", "MEDIA").unwrap());
        assert!(!has_column(&conn, "read", "author").unwrap());
        assert!(table_columns(&conn, "missing").unwrap().is_empty());
        assert_eq!(row_count(&conn, "read").unwrap(), 2);
        assert_eq!(null_count(&conn, "read", "media").unwrap(), 1);
    }

    #[test]
    fn test_table_exists() {
        let conn = sample();
        assert!(table_exists(&conn, "read").unwrap());
        assert!(table_exists(&conn, "READ").unwrap());
        assert!(!table_exists(&conn, "readings").unwrap());
    }

    #[test]
    fn test_snapshot_and_quick_check() {
        let conn = sample();
        let snapshot = schema_snapshot(&conn).unwrap();
        let names: Vec<_> = snapshot.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["idx_read_media", "read"]);
        assert_eq!(quick_check(&conn).unwrap(), None);
    }
}
