//! Backup creation
//!
//! A backup is copied to a temporary file inside the backups directory,
//! verified against the source, and only then moved to its final name.

use chrono::Utc;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use super::{parse_backup_stem, BackupRecord};
use crate::config::Settings;
use crate::error::{CoreError, CoreResult};
use crate::util::{copy_to_temp, timestamp_slug, validate_name};

const MAX_NAME_ATTEMPTS: u32 = 100;

/// Creates and lists backup records in one backups directory
#[derive(Debug, Clone)]
pub struct BackupManager {
    backup_dir: PathBuf,
    logical_name: String,
}

impl BackupManager {
    /// Create a manager for a backups directory and logical database name
    #[must_use]
    pub fn new(backup_dir: impl Into<PathBuf>, logical_name: impl Into<String>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            logical_name: logical_name.into(),
        }
    }

    /// Manager for the configured backups directory
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.backups_dir(), settings.logical_name())
    }

    /// Directory backups are written to
    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Copy `source` into the backups directory as
    /// `<logical>_<tag>_<YYYYMMDD_HHMMSS>.<ext>`.
    ///
    /// # Errors
    /// Returns `Io` if the source is missing or unreadable, `Backup` if the
    /// copy cannot be written or does not match the source
    pub fn create_backup(&self, source: &Path, tag: &str) -> CoreResult<BackupRecord> {
        validate_name(tag).map_err(|e| CoreError::backup(source, format!("invalid tag: {e}")))?;
        validate_name(&self.logical_name)
            .map_err(|e| CoreError::backup(source, format!("invalid logical name: {e}")))?;

        if !source.is_file() {
            return Err(CoreError::io(
                source,
                io::Error::new(io::ErrorKind::NotFound, "backup source does not exist"),
            ));
        }
        File::open(source).map_err(|e| CoreError::io(source, e))?;

        fs::create_dir_all(&self.backup_dir).map_err(|e| {
            CoreError::backup(
                source,
                format!(
                    "cannot create backup directory {}: {e}",
                    self.backup_dir.display()
                ),
            )
        })?;

        let created_at = Utc::now();
        let (mut temp, outcome) = copy_to_temp(source, &self.backup_dir, &mut |_, _| {})
            .map_err(|e| CoreError::backup(source, e.to_string()))?;

        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("db");
        let base = format!("{}_{tag}_{}", self.logical_name, timestamp_slug(created_at));

        let mut attempt = 0;
        let path = loop {
            let candidate = if attempt == 0 {
                self.backup_dir.join(format!("{base}.{ext}"))
            } else {
                self.backup_dir.join(format!("{base}_{attempt}.{ext}"))
            };
            match temp.persist_noclobber(&candidate) {
                Ok(_) => break candidate,
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    if attempt >= MAX_NAME_ATTEMPTS {
                        return Err(CoreError::backup(
                            source,
                            format!("no free backup name for {base}"),
                        ));
                    }
                    temp = e.file;
                }
                Err(e) => {
                    return Err(CoreError::backup(
                        source,
                        format!("cannot move backup into place: {}", e.error),
                    ));
                }
            }
        };

        tracing::info!(
            source = %source.display(),
            backup = %path.display(),
            bytes = outcome.bytes,
            tag,
            "backup created"
        );

        Ok(BackupRecord {
            path,
            source: Some(source.to_path_buf()),
            logical_name: self.logical_name.clone(),
            tag: tag.to_string(),
            created_at,
            size_bytes: outcome.bytes,
            sha256: Some(outcome.sha256),
        })
    }

    /// Backups in the directory that match the naming pattern, newest first.
    /// A missing directory yields an empty list.
    ///
    /// # Errors
    /// Returns an error if the directory exists but cannot be read
    pub fn list_backups(&self) -> CoreResult<Vec<BackupRecord>> {
        if !self.backup_dir.is_dir() {
            return Ok(Vec::new());
        }

        let entries =
            fs::read_dir(&self.backup_dir).map_err(|e| CoreError::io(&self.backup_dir, e))?;
        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CoreError::io(&self.backup_dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some((tag, created_at)) = parse_backup_stem(stem, &self.logical_name) else {
                continue;
            };
            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            records.push(BackupRecord {
                path,
                source: None,
                logical_name: self.logical_name.clone(),
                tag,
                created_at,
                size_bytes,
                sha256: None,
            });
        }

        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.path.cmp(&a.path))
        });
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::sha256_file;
    use tempfile::TempDir;

    #[test]
    fn test_backup_is_identical_and_named() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("reading_list.db");
        fs::write(&source, b"SQLite format 3\0 pretend content").unwrap();

        let manager = BackupManager::new(dir.path().join("backups"), "reading_list");
        let record = manager.create_backup(&source, "manual").unwrap();

        assert!(record.path.starts_with(dir.path().join("backups")));
        let name = record.path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("reading_list_manual_"));
        assert!(name.ends_with(".db"));
        assert_eq!(fs::read(&record.path).unwrap(), fs::read(&source).unwrap());
        assert_eq!(record.sha256.unwrap(), sha256_file(&source).unwrap());
    }

    #[test]
    fn test_same_second_backups_do_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("reading_list.db");
        fs::write(&source, b"v1").unwrap();

        let manager = BackupManager::new(dir.path().join("backups"), "reading_list");
        let first = manager.create_backup(&source, "manual").unwrap();
        fs::write(&source, b"v2").unwrap();
        let second = manager.create_backup(&source, "manual").unwrap();

        assert_ne!(first.path, second.path);
        assert_eq!(fs::read(&first.path).unwrap(), b"v1");
        assert_eq!(fs::read(&second.path).unwrap(), b"v2");
        assert_eq!(manager.list_backups().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_source_is_io_failure() {
        let dir = TempDir::new().unwrap();
        let manager = BackupManager::new(dir.path().join("backups"), "reading_list");
        let err = manager
            .create_backup(&dir.path().join("missing.db"), "manual")
            .unwrap_err();
        assert_eq!(err.code(), "IO_FAILURE");
        assert!(!dir.path().join("backups").exists());
    }

    #[test]
    fn test_invalid_tag_rejected() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("reading_list.db");
        fs::write(&source, b"x").unwrap();
        let manager = BackupManager::new(dir.path().join("backups"), "reading_list");
        let err = manager.create_backup(&source, "../up").unwrap_err();
        assert_eq!(err.code(), "BACKUP_FAILURE");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("reading_list.db");
        fs::write(&source, b"content").unwrap();
        let manager = BackupManager::new(dir.path().join("backups"), "reading_list");
        manager.create_backup(&source, "manual").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path().join("backups"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("reading_list_manual_"));
    }

    #[test]
    fn test_list_ignores_unrelated_files() {
        let dir = TempDir::new().unwrap();
        let backups = dir.path().join("backups");
        fs::create_dir_all(&backups).unwrap();
        fs::write(backups.join("notes.txt"), "x").unwrap();
        fs::write(backups.join("reading_list_manual_20260101_120000.db"), "a").unwrap();
        fs::write(backups.join("reading_list_before_import_20260102_120000.db"), "b").unwrap();

        let manager = BackupManager::new(&backups, "reading_list");
        let listed = manager.list_backups().unwrap();
        let tags: Vec<_> = listed.iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(tags, vec!["before_import", "manual"]);
    }
}
