//! Transfer formats and import format detection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};
use crate::util::timestamp_slug;

const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
const SNIFF_BYTES: u64 = 4096;
const SQL_KEYWORDS: &[&str] = &[
    "BEGIN", "CREATE", "INSERT", "PRAGMA", "DROP", "ALTER", "UPDATE", "DELETE", "REPLACE",
    "WITH", "COMMIT", "SAVEPOINT",
];

/// Supported transfer formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferFormat {
    /// Byte copy of the SQLite file
    Native,
    /// Replayable SQL dump
    SqlScript,
    /// Directory with one CSV file per table
    Tabular,
}

impl TransferFormat {
    /// Name used on the command line and in manifests
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::SqlScript => "sql-script",
            Self::Tabular => "tabular",
        }
    }

    /// Default export destination inside `dir`:
    /// `<logical>_export_<ts>.db`, `.sql`, or a directory for tabular
    #[must_use]
    pub fn default_output(self, dir: &Path, logical_name: &str, at: DateTime<Utc>) -> PathBuf {
        let base = format!("{logical_name}_export_{}", timestamp_slug(at));
        match self {
            Self::Native => dir.join(format!("{base}.db")),
            Self::SqlScript => dir.join(format!("{base}.sql")),
            Self::Tabular => dir.join(base),
        }
    }

    /// Work out which format an import source is in.
    ///
    /// A SQLite header means native, a directory holding `.csv` files means
    /// tabular, and a `.sql` file or UTF-8 text starting with a SQL
    /// statement means sql-script.
    ///
    /// # Errors
    /// Returns `Io` if the source does not exist or cannot be read, and
    /// `UnsupportedFormat` if it matches none of the formats
    pub fn detect(source: &Path) -> CoreResult<Self> {
        let unsupported = |reason: &str| CoreError::UnsupportedFormat {
            path: source.to_path_buf(),
            reason: reason.to_string(),
        };

        if source.is_dir() {
            return if has_csv_files(source).map_err(|e| CoreError::io(source, e))? {
                Ok(Self::Tabular)
            } else {
                Err(unsupported("directory contains no .csv files"))
            };
        }
        if !source.exists() {
            return Err(CoreError::io(
                source,
                io::Error::new(io::ErrorKind::NotFound, "import source does not exist"),
            ));
        }

        let mut head = Vec::new();
        File::open(source)
            .and_then(|f| f.take(SNIFF_BYTES).read_to_end(&mut head))
            .map_err(|e| CoreError::io(source, e))?;

        if head.starts_with(SQLITE_MAGIC) {
            return Ok(Self::Native);
        }
        if head.is_empty() {
            return Err(unsupported("file is empty"));
        }

        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("sql") => return Ok(Self::SqlScript),
            Some("csv") => {
                return Err(unsupported(
                    "tabular imports expect a directory of .csv files, not a single file",
                ))
            }
            _ => {}
        }

        match utf8_prefix(&head) {
            Some(text) if starts_with_sql(text) => Ok(Self::SqlScript),
            Some(_) => Err(unsupported("text does not start with a SQL statement")),
            None => Err(unsupported("not a SQLite database, SQL script or CSV directory")),
        }
    }
}

impl fmt::Display for TransferFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" | "db" | "sqlite" => Ok(Self::Native),
            "sql-script" | "sql" => Ok(Self::SqlScript),
            "tabular" | "csv" => Ok(Self::Tabular),
            other => Err(format!(
                "unknown format '{other}' (expected native, sql-script or tabular)"
            )),
        }
    }
}

fn has_csv_files(dir: &Path) -> io::Result<bool> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_csv(&path) {
            return Ok(true);
        }
    }
    Ok(false)
}

pub(crate) fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}

// The sniffed prefix may end inside a multi-byte character.
fn utf8_prefix(bytes: &[u8]) -> Option<&str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(e) if e.error_len().is_none() => std::str::from_utf8(&bytes[..e.valid_up_to()]).ok(),
        Err(_) => None,
    }
}

fn starts_with_sql(text: &str) -> bool {
    let mut rest = text.trim_start_matches('\u{feff}');
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }
    let word: String = rest
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect::<String>()
        .to_ascii_uppercase();
    SQL_KEYWORDS.contains(&word.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_sqlite_header() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("anything.bin");
        rusqlite::Connection::open(&db)
            .unwrap()
            .execute_batch("CREATE TABLE t (x);")
            .unwrap();
        assert_eq!(TransferFormat::detect(&db).unwrap(), TransferFormat::Native);
    }

    #[test]
    fn test_detect_sql_by_content_and_extension() {
        let dir = TempDir::new().unwrap();
        let dump = dir.path().join("dump.txt");
        fs::write(&dump, "-- exported\n/* note */ BEGIN TRANSACTION;\nCOMMIT;\n").unwrap();
        assert_eq!(TransferFormat::detect(&dump).unwrap(), TransferFormat::SqlScript);

        let named = dir.path().join("dump.sql");
        fs::write(&named, "whatever").unwrap();
        assert_eq!(TransferFormat::detect(&named).unwrap(), TransferFormat::SqlScript);
    }

    #[test]
    fn test_detect_csv_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("read.csv"), "id,title\n1,Dune\n").unwrap();
        assert_eq!(TransferFormat::detect(dir.path()).unwrap(), TransferFormat::Tabular);
    }

    #[test]
    fn test_detect_rejects_unknown() {
        let dir = TempDir::new().unwrap();
        let text = dir.path().join("notes.txt");
        fs::write(&text, "just some notes").unwrap();
        let err = TransferFormat::detect(&text).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_FORMAT");

        let binary = dir.path().join("blob.bin");
        fs::write(&binary, [0xff, 0xfe, 0x00, 0x81]).unwrap();
        assert_eq!(
            TransferFormat::detect(&binary).unwrap_err().code(),
            "UNSUPPORTED_FORMAT"
        );

        let empty_dir = dir.path().join("empty");
        fs::create_dir(&empty_dir).unwrap();
        assert_eq!(
            TransferFormat::detect(&empty_dir).unwrap_err().code(),
            "UNSUPPORTED_FORMAT"
        );

        assert_eq!(
            TransferFormat::detect(&dir.path().join("missing.db"))
                .unwrap_err()
                .code(),
            "IO_FAILURE"
        );
    }

    #[test]
    fn test_parse_and_default_output() {
        assert_eq!("sql".parse::<TransferFormat>().unwrap(), TransferFormat::SqlScript);
        assert_eq!("CSV".parse::<TransferFormat>().unwrap(), TransferFormat::Tabular);
        assert!("xml".parse::<TransferFormat>().is_err());

        let at = DateTime::parse_from_rfc3339("2026-10-16T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            TransferFormat::Native.default_output(Path::new("/out"), "reading_list", at),
            PathBuf::from("/out/reading_list_export_20261016_093000.db")
        );
        assert_eq!(
            TransferFormat::Tabular.default_output(Path::new("/out"), "reading_list", at),
            PathBuf::from("/out/reading_list_export_20261016_093000")
        );
    }
}
