//! Shared fixtures for core integration tests

#![allow(dead_code)]

use rusqlite::Connection;
use shelfguard_core::Settings;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// A project root with a populated reading-list database at the default path
pub fn project_with_reading_list() -> (TempDir, Settings) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let settings = Settings::for_root(dir.path());
    create_reading_list(&settings.database_path());
    (dir, settings)
}

/// Create the reading-list schema with a few rows
pub fn create_reading_list(path: &Path) {
    fs::create_dir_all(path.parent().expect("database path has a parent"))
        .expect("Failed to create database dir");
    let conn = Connection::open(path).expect("Failed to open database");
    conn.execute_batch(
        r"
        CREATE TABLE read (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            author TEXT,
            date_started DATE,
            days_estimate INTEGER,
            date_finished_actual DATE,
            rating REAL
        );
        CREATE TABLE inventory (
            id INTEGER PRIMARY KEY,
            read_id INTEGER REFERENCES read(id),
            format TEXT
        );
        CREATE INDEX idx_read_author ON read(author);
        INSERT INTO read (title, author, date_started, days_estimate, date_finished_actual, rating)
        VALUES ('Dune', 'Herbert', '2026-01-01', 14, NULL, NULL),
               ('Emma', 'Austen', '2026-02-01', 7, '2026-02-09', 4.5),
               ('Ulysses', 'Joyce', NULL, NULL, NULL, NULL);
        INSERT INTO inventory (read_id, format) VALUES (1, 'kindle'), (2, 'paper');
        ",
    )
    .expect("Failed to seed database");
}

/// Row count of a table
pub fn count_rows(path: &Path, table: &str) -> i64 {
    Connection::open(path)
        .expect("Failed to open database")
        .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |r| r.get(0))
        .expect("Failed to count rows")
}
