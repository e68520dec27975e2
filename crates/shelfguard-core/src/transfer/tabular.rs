//! CSV directory export and import
//!
//! One `<table>.csv` per table, header row first. Types are not preserved:
//! NULL and the empty string both become an empty cell, and blobs are
//! written as hex.

use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::format::is_csv;
use super::{StepError, TransferProgress};
use crate::error::{CoreError, CoreResult};
use crate::storage::schema;
use crate::util::quote_identifier;

/// Tables written and their total row count
#[derive(Debug, Default)]
pub(crate) struct TabularStats {
    pub tables: Vec<String>,
    pub rows: u64,
    pub bytes: u64,
}

/// Write every user table to `<dir>/<table>.csv`
pub(crate) fn write_tables(
    conn: &Connection,
    dir: &Path,
    progress: &mut dyn FnMut(TransferProgress),
) -> Result<TabularStats, StepError> {
    let tables: Vec<String> = schema::list_tables(conn)?
        .into_iter()
        .filter(|name| {
            let usable = !name.contains(['/', '\\']) && !name.starts_with('.');
            if !usable {
                tracing::warn!(table = %name, "table name cannot be used as a file name, skipping");
            }
            usable
        })
        .collect();

    let mut stats = TabularStats::default();
    for (idx, table) in tables.iter().enumerate() {
        let path = dir.join(format!("{table}.csv"));
        let rows = write_table(conn, table, &path)?;
        stats.bytes += fs::metadata(&path)?.len();
        stats.rows += rows;
        stats.tables.push(table.clone());
        progress(TransferProgress::Table {
            name: table.clone(),
            index: idx + 1,
            count: tables.len(),
            rows,
        });
    }
    Ok(stats)
}

fn write_table(conn: &Connection, table: &str, path: &Path) -> Result<u64, StepError> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_identifier(table)))?;
    let columns = stmt.column_count();
    writer.write_record(stmt.column_names())?;

    let mut rows = stmt.query([])?;
    let mut count = 0;
    let mut record = Vec::with_capacity(columns);
    while let Some(row) = rows.next()? {
        record.clear();
        for i in 0..columns {
            record.push(cell(row.get_ref(i)?));
        }
        writer.write_record(&record)?;
        count += 1;
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(count)
}

fn cell(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => hex::encode(bytes),
    }
}

/// CSV files in a directory, sorted by name
pub(crate) fn csv_files(dir: &Path) -> CoreResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| CoreError::io(dir, e))? {
        let path = entry.map_err(|e| CoreError::io(dir, e))?.path();
        if path.is_file() && is_csv(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load each CSV file into the table named by its file stem.
///
/// An existing table keeps its definition and has its rows replaced; a
/// missing one is created with `TEXT` columns. Everything happens in one
/// transaction.
pub(crate) fn load_tables(
    conn: &mut Connection,
    files: &[PathBuf],
    progress: &mut dyn FnMut(TransferProgress),
) -> CoreResult<Vec<String>> {
    conn.pragma_update(None, "foreign_keys", "OFF")?;
    let tx = conn.transaction()?;

    let mut loaded = Vec::new();
    for (idx, path) in files.iter().enumerate() {
        let invalid = |reason: String| CoreError::ImportValidation {
            path: path.clone(),
            reason,
        };
        let table = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid("file name is not a usable table name".to_string()))?
            .to_string();

        let rows = load_table(&tx, &table, path).map_err(invalid)?;
        tracing::debug!(table = %table, rows, "table loaded from CSV");
        progress(TransferProgress::Table {
            name: table.clone(),
            index: idx + 1,
            count: files.len(),
            rows,
        });
        loaded.push(table);
    }

    tx.commit()?;
    loaded.sort();
    Ok(loaded)
}

fn load_table(conn: &Connection, table: &str, path: &Path) -> Result<u64, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_path(path)
        .map_err(|e| e.to_string())?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| format!("cannot read header row: {e}"))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    check_headers(&headers)?;

    let quoted = quote_identifier(table);
    let existing: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            params![table],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| e.to_string())?;

    if let Some(existing) = existing {
        let columns = schema::table_columns(conn, &existing).map_err(|e| e.to_string())?;
        if let Some(unknown) = headers
            .iter()
            .find(|h| !columns.iter().any(|c| c.eq_ignore_ascii_case(h)))
        {
            return Err(format!("column '{unknown}' does not exist in table '{existing}'"));
        }
        conn.execute(&format!("DELETE FROM {quoted}"), [])
            .map_err(|e| e.to_string())?;
    } else {
        let columns: Vec<String> = headers
            .iter()
            .map(|h| format!("{} TEXT", quote_identifier(h)))
            .collect();
        conn.execute(&format!("CREATE TABLE {quoted} ({})", columns.join(", ")), [])
            .map_err(|e| e.to_string())?;
    }

    let column_list: Vec<String> = headers.iter().map(|h| quote_identifier(h)).collect();
    let placeholders: Vec<String> = (1..=headers.len()).map(|i| format!("?{i}")).collect();
    let mut insert = conn
        .prepare(&format!(
            "INSERT INTO {quoted} ({}) VALUES ({})",
            column_list.join(", "),
            placeholders.join(", ")
        ))
        .map_err(|e| e.to_string())?;

    let mut count = 0;
    for (idx, record) in reader.records().enumerate() {
        // header is line 1
        let line = idx + 2;
        let record = record.map_err(|e| format!("line {line}: {e}"))?;
        let values = record.iter().map(|v| (!v.is_empty()).then_some(v));
        insert
            .execute(params_from_iter(values))
            .map_err(|e| format!("line {line}: {e}"))?;
        count += 1;
    }
    Ok(count)
}

fn check_headers(headers: &[String]) -> Result<(), String> {
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err("missing header row".to_string());
    }
    let mut seen = HashSet::new();
    for (idx, header) in headers.iter().enumerate() {
        if header.is_empty() {
            return Err(format!("empty column name in position {}", idx + 1));
        }
        if !seen.insert(header.to_ascii_lowercase()) {
            return Err(format!("duplicate column name '{header}'"));
        }
    }
    Ok(())
}
