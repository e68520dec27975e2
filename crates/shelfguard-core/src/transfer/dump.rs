//! SQL script dump
//!
//! Layout: table DDL each followed by its rows, then `sqlite_sequence`
//! contents, then index, view and trigger DDL, all inside one transaction.
//! The script replays cleanly into an empty database.
//!
//! Shadow tables are never written: creating a virtual table recreates them,
//! and the virtual table's rows are inserted through the table itself.

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::io::Write;

use super::{StepError, TransferProgress};
use crate::storage::schema::{self, SchemaEntry, TableKind};
use crate::util::quote_identifier;

/// What a dump contained
#[derive(Debug, Default)]
pub(crate) struct DumpStats {
    pub tables: Vec<String>,
    pub rows: u64,
}

pub(crate) fn write_dump<W: Write>(
    conn: &Connection,
    out: &mut W,
    progress: &mut dyn FnMut(TransferProgress),
) -> Result<DumpStats, StepError> {
    let snapshot = schema::schema_snapshot(conn)?;
    let shadow: Vec<String> = schema::table_kinds(conn)?
        .into_iter()
        .filter(|(_, kind)| *kind == TableKind::Shadow)
        .map(|(name, _)| name)
        .collect();
    let tables: Vec<&SchemaEntry> = snapshot
        .iter()
        .filter(|e| e.kind == "table" && !shadow.contains(&e.name))
        .collect();

    writeln!(out, "PRAGMA foreign_keys=OFF;")?;
    writeln!(out, "BEGIN TRANSACTION;")?;

    let mut stats = DumpStats::default();
    for (idx, table) in tables.iter().enumerate() {
        writeln!(out, "{};", table.sql)?;
        let rows = dump_rows(conn, &table.name, out)?;
        stats.rows += rows;
        stats.tables.push(table.name.clone());
        progress(TransferProgress::Table {
            name: table.name.clone(),
            index: idx + 1,
            count: tables.len(),
            rows,
        });
    }

    if schema::table_exists(conn, "sqlite_sequence")? {
        writeln!(out, "DELETE FROM sqlite_sequence;")?;
        let mut stmt = conn.prepare("SELECT name, seq FROM sqlite_sequence ORDER BY name")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            writeln!(
                out,
                "INSERT INTO sqlite_sequence VALUES({}, {});",
                sql_literal(row.get_ref(0)?),
                sql_literal(row.get_ref(1)?)
            )?;
        }
    }

    for kind in ["index", "view", "trigger"] {
        for entry in snapshot.iter().filter(|e| e.kind == kind) {
            writeln!(out, "{};", entry.sql)?;
        }
    }

    writeln!(out, "COMMIT;")?;
    Ok(stats)
}

fn dump_rows<W: Write>(conn: &Connection, table: &str, out: &mut W) -> Result<u64, StepError> {
    let quoted = quote_identifier(table);
    let mut stmt = conn.prepare(&format!("SELECT * FROM {quoted}"))?;
    let columns = stmt.column_count();
    let mut rows = stmt.query([])?;

    let mut count = 0;
    let mut values = Vec::with_capacity(columns);
    while let Some(row) = rows.next()? {
        values.clear();
        for i in 0..columns {
            values.push(sql_literal(row.get_ref(i)?));
        }
        writeln!(out, "INSERT INTO {quoted} VALUES({});", values.join(","))?;
        count += 1;
    }
    Ok(count)
}

/// Render a value as a SQLite literal
pub(crate) fn sql_literal(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) if f.is_nan() => "NULL".to_string(),
        ValueRef::Real(f) if f.is_infinite() && f > 0.0 => "1e999".to_string(),
        ValueRef::Real(f) if f.is_infinite() => "-1e999".to_string(),
        ValueRef::Real(f) => format!("{f:?}"),
        ValueRef::Text(bytes) => {
            format!("'{}'", String::from_utf8_lossy(bytes).replace('\'', "''"))
        }
        ValueRef::Blob(bytes) => format!("X'{}'", hex::encode_upper(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals() {
        assert_eq!(sql_literal(ValueRef::Null), "NULL");
        assert_eq!(sql_literal(ValueRef::Integer(-4)), "-4");
        assert_eq!(sql_literal(ValueRef::Real(2.5)), "2.5");
        assert_eq!(sql_literal(ValueRef::Real(3.0)), "3.0");
        assert_eq!(sql_literal(ValueRef::Real(f64::INFINITY)), "1e999");
        assert_eq!(sql_literal(ValueRef::Text(b"O'Brien")), "'O''Brien'");
        assert_eq!(sql_literal(ValueRef::Blob(&[0xde, 0xad])), "X'DEAD'");
    }

    #[test]
    fn test_dump_replays_into_empty_database() {
        let source = Connection::open_in_memory().unwrap();
        source
            .execute_batch(
                r"
                CREATE TABLE read (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT, rating REAL, cover BLOB);
                CREATE INDEX idx_read_title ON read(title);
                CREATE VIEW finished AS SELECT title FROM read WHERE rating IS NOT NULL;
                INSERT INTO read (title, rating, cover) VALUES ('It''s Dune', 4.5, X'00FF'), ('Emma', NULL, NULL);
                DELETE FROM read WHERE title = 'Emma';
                ",
            )
            .unwrap();

        let mut script = Vec::new();
        let mut events = Vec::new();
        let stats = write_dump(&source, &mut script, &mut |p| events.push(p)).unwrap();
        assert_eq!(stats.tables, vec!["read".to_string()]);
        assert_eq!(stats.rows, 1);
        assert_eq!(events.len(), 1);

        let script = String::from_utf8(script).unwrap();
        let target = Connection::open_in_memory().unwrap();
        target.execute_batch(&script).unwrap();

        assert_eq!(
            schema::schema_snapshot(&target).unwrap(),
            schema::schema_snapshot(&source).unwrap()
        );
        let (title, cover): (String, Vec<u8>) = target
            .query_row("SELECT title, cover FROM read", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!(title, "It's Dune");
        assert_eq!(cover, vec![0x00, 0xff]);
        let seq: i64 = target
            .query_row("SELECT seq FROM sqlite_sequence WHERE name = 'read'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(seq, 2);
    }

    #[test]
    fn test_dump_with_fts_table_replays() {
        let source = Connection::open_in_memory().unwrap();
        source
            .execute_batch(
                r"
                CREATE TABLE read (id INTEGER PRIMARY KEY, title TEXT);
                CREATE VIRTUAL TABLE notes USING fts5(body);
                INSERT INTO read (title) VALUES ('Dune');
                INSERT INTO notes (body) VALUES ('spice must flow'), ('desert planet');
                ",
            )
            .unwrap();

        let mut script = Vec::new();
        let stats = write_dump(&source, &mut script, &mut |_| {}).unwrap();
        assert_eq!(stats.tables, vec!["notes".to_string(), "read".to_string()]);
        assert_eq!(stats.rows, 3);

        let script = String::from_utf8(script).unwrap();
        assert!(!script.contains("notes_config"));

        let target = Connection::open_in_memory().unwrap();
        target.execute_batch(&script).unwrap();
        assert_eq!(
            schema::schema_snapshot(&target).unwrap(),
            schema::schema_snapshot(&source).unwrap()
        );
        let hits: i64 = target
            .query_row("SELECT COUNT(*) FROM notes WHERE notes MATCH 'spice'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(hits, 1);
    }
}
