//! Exclusive operation lock
//!
//! Migrations, imports, exports and restores each hold this lock for their
//! critical section. The lock is a file created with create-new semantics
//! next to the database; it is removed when the guard is dropped.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// Lock file guarding a database file: `<database>.lock`
#[must_use]
pub fn lock_path_for(database: &Path) -> PathBuf {
    let mut name = database
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".lock");
    database.with_file_name(name)
}

/// Guard for an exclusive operation on the live database
#[derive(Debug)]
pub struct OperationLock {
    path: PathBuf,
}

impl OperationLock {
    /// Acquire the lock for `operation`
    ///
    /// # Errors
    /// Returns `Busy` if the lock file already exists, or `Io` if it cannot
    /// be created
    pub fn acquire(lock_path: &Path, operation: &str) -> CoreResult<Self> {
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
            }
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(CoreError::Busy {
                    lock_path: lock_path.to_path_buf(),
                });
            }
            Err(e) => return Err(CoreError::io(lock_path, e)),
        };

        let guard = Self {
            path: lock_path.to_path_buf(),
        };
        writeln!(file, "pid={}\noperation={operation}", std::process::id())
            .map_err(|e| CoreError::io(lock_path, e))?;
        tracing::debug!(lock = %lock_path.display(), operation, "lock acquired");
        Ok(guard)
    }

    /// Path of the lock file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to remove lock file");
        } else {
            tracing::debug!(lock = %self.path.display(), "lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_busy() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("live.db.lock");

        let first = OperationLock::acquire(&lock_path, "migrate").unwrap();
        let second = OperationLock::acquire(&lock_path, "import");
        assert!(matches!(second, Err(CoreError::Busy { .. })));

        drop(first);
        assert!(!lock_path.exists());
        assert!(OperationLock::acquire(&lock_path, "import").is_ok());
    }

    #[test]
    fn test_lock_path_sits_next_to_database() {
        assert_eq!(
            lock_path_for(Path::new("/srv/db/reading_list.db")),
            PathBuf::from("/srv/db/reading_list.db.lock")
        );
    }

    #[test]
    fn test_lock_records_operation() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("nested/live.db.lock");
        let lock = OperationLock::acquire(&lock_path, "export").unwrap();
        let content = fs::read_to_string(lock.path()).unwrap();
        assert!(content.contains("operation=export"));
    }
}
