//! Explicit restore of a backup over the live database

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::{BackupManager, BackupRecord};
use crate::config::Settings;
use crate::error::{CoreError, CoreResult};
use crate::storage::{schema, OperationLock, Session};
use crate::util::{copy_to_temp, parent_dir};

/// What a restore did
#[derive(Debug, Clone, Serialize)]
pub struct RestoreOutcome {
    /// Backup file the live database was restored from
    pub restored_from: PathBuf,
    /// Live database path that was replaced
    pub live: PathBuf,
    /// Backup of the live database taken just before the restore
    pub previous_backup: Option<BackupRecord>,
    /// Bytes written
    pub bytes: u64,
}

/// Check that a file is an openable SQLite database passing `quick_check`
///
/// # Errors
/// Returns `Io` if the file is missing, or `ImportValidation` if it is not a
/// healthy SQLite database
pub fn verify_backup(path: &Path) -> CoreResult<()> {
    let session = Session::open_read_only(path)?;
    let invalid = |reason: String| CoreError::ImportValidation {
        path: path.to_path_buf(),
        reason,
    };
    match schema::quick_check(session.connection()) {
        Ok(None) => Ok(()),
        Ok(Some(problem)) => Err(invalid(format!("integrity check failed: {problem}"))),
        Err(e) => Err(invalid(format!("not a readable SQLite database: {e}"))),
    }
}

/// Replace the live database with `backup`.
///
/// The live file is backed up first with tag `before_restore` unless
/// `backup_current` is false or there is no live file yet.
///
/// # Errors
/// Returns `Busy` if another operation holds the lock, an error from
/// [`verify_backup`] if the backup is unusable, or `Transfer` if the
/// replacement fails
pub fn restore_backup(
    settings: &Settings,
    backup: &Path,
    backup_current: bool,
) -> CoreResult<RestoreOutcome> {
    let live = settings.database_path();
    let _lock = OperationLock::acquire(&settings.lock_path(), "restore")?;

    verify_backup(backup)?;

    let previous_backup = if backup_current && live.is_file() {
        let manager = BackupManager::from_settings(settings);
        Some(manager.create_backup(&live, "before_restore")?)
    } else {
        None
    };
    let kept = previous_backup.as_ref().map(|r| r.path.as_path());

    let live_dir = parent_dir(&live);
    fs::create_dir_all(live_dir).map_err(|e| CoreError::transfer("restore", e, kept))?;
    let (temp, outcome) = copy_to_temp(backup, live_dir, &mut |_, _| {})
        .map_err(|e| CoreError::transfer("restore", e, kept))?;
    temp.persist(&live)
        .map_err(|e| CoreError::transfer("restore", e.error, kept))?;

    tracing::info!(
        backup = %backup.display(),
        live = %live.display(),
        bytes = outcome.bytes,
        "database restored from backup"
    );

    Ok(RestoreOutcome {
        restored_from: backup.to_path_buf(),
        live,
        previous_backup,
        bytes: outcome.bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn make_db(path: &Path, rows: i64) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let conn = Connection::open(path).unwrap();
        conn.execute_batch("CREATE TABLE read (id INTEGER PRIMARY KEY, title TEXT);")
            .unwrap();
        for i in 0..rows {
            conn.execute("INSERT INTO read (title) VALUES (?1)", [format!("book {i}")])
                .unwrap();
        }
    }

    fn count(path: &Path) -> i64 {
        Connection::open(path)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM read", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_restore_replaces_live_and_keeps_previous() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::for_root(dir.path());
        let live = settings.database_path();
        make_db(&live, 3);
        let saved = dir.path().join("saved.db");
        make_db(&saved, 7);

        let outcome = restore_backup(&settings, &saved, true).unwrap();

        assert_eq!(count(&live), 7);
        let previous = outcome.previous_backup.unwrap();
        assert_eq!(previous.tag, "before_restore");
        assert_eq!(count(&previous.path), 3);
        assert!(!settings.lock_path().exists());
    }

    #[test]
    fn test_restore_rejects_non_database() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::for_root(dir.path());
        let live = settings.database_path();
        make_db(&live, 2);
        let junk = dir.path().join("junk.db");
        fs::write(&junk, "definitely not sqlite").unwrap();

        let err = restore_backup(&settings, &junk, true).unwrap_err();
        assert_eq!(err.code(), "IMPORT_VALIDATION");
        assert_eq!(count(&live), 2);
        assert!(!settings.backups_dir().exists());
    }

    #[test]
    fn test_restore_without_live_file() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::for_root(dir.path());
        let saved = dir.path().join("saved.db");
        make_db(&saved, 1);

        let outcome = restore_backup(&settings, &saved, true).unwrap();
        assert!(outcome.previous_backup.is_none());
        assert_eq!(count(&settings.database_path()), 1);
    }
}
