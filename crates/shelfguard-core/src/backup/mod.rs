//! Backup records for the live database file

pub mod create;
pub mod restore;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use create::BackupManager;
pub use restore::{restore_backup, verify_backup, RestoreOutcome};

/// An immutable copy of the database taken at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Where the backup file lives
    pub path: PathBuf,
    /// Database the copy was taken from (unknown for listed backups)
    pub source: Option<PathBuf>,
    /// Logical database name used in the file name
    pub logical_name: String,
    /// Operation that triggered the backup
    pub tag: String,
    /// When the copy was taken (UTC)
    pub created_at: DateTime<Utc>,
    /// Size in bytes
    pub size_bytes: u64,
    /// SHA256 of the content, when computed
    pub sha256: Option<String>,
}

/// Split a backup file stem `<logical>_<tag>_<YYYYMMDD>_<HHMMSS>[_<n>]`
/// into tag and timestamp.
pub(crate) fn parse_backup_stem(stem: &str, logical_name: &str) -> Option<(String, DateTime<Utc>)> {
    let rest = stem.strip_prefix(logical_name)?.strip_prefix('_')?;
    let mut parts: Vec<&str> = rest.split('_').collect();

    let is_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if parts.len() >= 4 {
        if let Some(last) = parts.last() {
            if is_digits(last) && last.len() < 6 {
                parts.pop();
            }
        }
    }
    if parts.len() < 3 {
        return None;
    }

    let time = parts.pop()?;
    let date = parts.pop()?;
    if time.len() != 6 || date.len() != 8 || !is_digits(time) || !is_digits(date) {
        return None;
    }
    let tag = parts.join("_");
    if tag.is_empty() {
        return None;
    }

    let naive =
        chrono::NaiveDateTime::parse_from_str(&format!("{date}{time}"), "%Y%m%d%H%M%S").ok()?;
    Some((tag, Utc.from_utc_datetime(&naive)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backup_stem() {
        let (tag, at) =
            parse_backup_stem("reading_list_before_import_20261016_093000", "reading_list")
                .unwrap();
        assert_eq!(tag, "before_import");
        assert_eq!(at.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-10-16 09:30:00");
    }

    #[test]
    fn test_parse_backup_stem_with_collision_suffix() {
        let (tag, _) =
            parse_backup_stem("reading_list_manual_20261016_093000_2", "reading_list").unwrap();
        assert_eq!(tag, "manual");
    }

    #[test]
    fn test_parse_backup_stem_rejects_foreign_files() {
        assert!(parse_backup_stem("other_manual_20261016_093000", "reading_list").is_none());
        assert!(parse_backup_stem("reading_list_20261016_093000", "reading_list").is_none());
        assert!(parse_backup_stem("reading_list_manual_2026_0930", "reading_list").is_none());
    }
}
