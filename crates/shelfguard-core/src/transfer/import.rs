//! Import into the live database
//!
//! The candidate database is built in a temporary file next to the live
//! file and validated there. Only then is the live file backed up and
//! replaced by a rename.

use chrono::Utc;
use std::fs;
use std::io;
use std::path::Path;
use tempfile::NamedTempFile;

use super::tabular::{csv_files, load_tables};
use super::{TransferDirection, TransferEngine, TransferFormat, TransferManifest, TransferProgress};
use crate::backup::BackupManager;
use crate::error::{CoreError, CoreResult};
use crate::storage::{schema, OperationLock, Session};
use crate::util::{copy_to_temp, parent_dir};

impl TransferEngine<'_> {
    /// Replace the live database with the contents of `source`
    ///
    /// # Errors
    /// See [`TransferEngine::import_with_progress`]
    pub fn import(&self, source: &Path, take_backup: bool) -> CoreResult<TransferManifest> {
        self.import_with_progress(source, take_backup, |_| {})
    }

    /// Import `source`, reporting progress to `progress`.
    ///
    /// With `take_backup`, the live file is copied to the backups directory
    /// (tag `before_import`) right before it is replaced. A failure after
    /// that point reports the backup path and leaves the backup in place.
    ///
    /// # Errors
    /// - `Io` if the source cannot be read
    /// - `UnsupportedFormat` if the source is not a recognised format
    /// - `ImportValidation` if the candidate fails checks (live file untouched)
    /// - `Busy` if another operation holds the lock
    /// - `Backup` if the pre-import backup fails
    /// - `Transfer` if the final replacement fails
    pub fn import_with_progress(
        &self,
        source: &Path,
        take_backup: bool,
        progress: impl FnMut(TransferProgress),
    ) -> CoreResult<TransferManifest> {
        self.import_with(source, take_backup, progress, replace_live)
    }

    fn import_with<P, R>(
        &self,
        source: &Path,
        take_backup: bool,
        mut progress: P,
        replace: R,
    ) -> CoreResult<TransferManifest>
    where
        P: FnMut(TransferProgress),
        R: FnOnce(NamedTempFile, &Path) -> io::Result<()>,
    {
        let format = TransferFormat::detect(source)?;
        tracing::debug!(source = %source.display(), %format, "import format detected");

        let live = self.settings.database_path();
        let _lock = OperationLock::acquire(&self.settings.lock_path(), "import")?;
        let live_dir = parent_dir(&live);
        fs::create_dir_all(live_dir).map_err(|e| CoreError::io(live_dir, e))?;

        let candidate = match format {
            TransferFormat::Native => native_candidate(source, live_dir, &mut progress)?,
            TransferFormat::SqlScript => script_candidate(source, live_dir)?,
            TransferFormat::Tabular => tabular_candidate(source, &live, live_dir, &mut progress)?,
        };
        let (tables, rows) = validate_candidate(
            candidate.path(),
            source,
            &self.settings.transfer.core_table,
        )?;

        let backup = if take_backup && live.is_file() {
            let manager = BackupManager::from_settings(self.settings);
            Some(manager.create_backup(&live, "before_import")?.path)
        } else {
            if take_backup {
                tracing::debug!(live = %live.display(), "no live database to back up");
            }
            None
        };

        if let Ok(meta) = fs::metadata(&live) {
            if let Err(e) = fs::set_permissions(candidate.path(), meta.permissions()) {
                tracing::warn!(error = %e, "could not carry over live file permissions");
            }
        }

        if let Err(e) = replace(candidate, &live) {
            tracing::error!(
                live = %live.display(),
                backup = ?backup,
                error = %e,
                "replacing the live database failed"
            );
            return Err(CoreError::transfer("replace", e, backup.as_deref()));
        }

        let bytes = fs::metadata(&live)
            .map_err(|e| CoreError::transfer("replace", e, backup.as_deref()))?
            .len();

        let mut manifest = TransferManifest::completed(
            TransferDirection::Import,
            format,
            source.to_path_buf(),
            live.clone(),
        );
        manifest.backup = backup;
        manifest.tables = tables;
        manifest.rows = rows;
        manifest.bytes = bytes;
        manifest.completed_at = Utc::now();

        tracing::info!(
            id = %manifest.id,
            format = %format,
            source = %source.display(),
            tables = manifest.tables.len(),
            rows,
            "import complete"
        );
        Ok(manifest)
    }
}

fn replace_live(candidate: NamedTempFile, live: &Path) -> io::Result<()> {
    candidate.persist(live).map(drop).map_err(|e| e.error)
}

fn native_candidate(
    source: &Path,
    live_dir: &Path,
    progress: &mut dyn FnMut(TransferProgress),
) -> CoreResult<NamedTempFile> {
    let (candidate, _) = copy_to_temp(source, live_dir, &mut |copied, total| {
        progress(TransferProgress::Bytes { copied, total });
    })
    .map_err(|e| CoreError::io(source, e))?;
    Ok(candidate)
}

fn script_candidate(source: &Path, live_dir: &Path) -> CoreResult<NamedTempFile> {
    let invalid = |reason: String| CoreError::ImportValidation {
        path: source.to_path_buf(),
        reason,
    };

    let raw = fs::read(source).map_err(|e| CoreError::io(source, e))?;
    let script =
        String::from_utf8(raw).map_err(|_| invalid("script is not UTF-8 text".to_string()))?;

    let candidate = NamedTempFile::new_in(live_dir).map_err(|e| CoreError::io(live_dir, e))?;
    let session = Session::create(candidate.path())?;
    session
        .connection()
        .execute_batch(&script)
        .map_err(|e| invalid(format!("script failed on an empty database: {e}")))?;
    session.close()?;
    Ok(candidate)
}

fn tabular_candidate(
    source: &Path,
    live: &Path,
    live_dir: &Path,
    progress: &mut dyn FnMut(TransferProgress),
) -> CoreResult<NamedTempFile> {
    let files = csv_files(source)?;
    let candidate = if live.is_file() {
        copy_to_temp(live, live_dir, &mut |_, _| {})
            .map_err(|e| CoreError::io(live, e))?
            .0
    } else {
        NamedTempFile::new_in(live_dir).map_err(|e| CoreError::io(live_dir, e))?
    };

    let mut session = Session::open(candidate.path())?;
    load_tables(session.connection_mut(), &files, progress)?;
    session.close()?;
    Ok(candidate)
}

/// Structural checks on a candidate. Returns its tables and total rows.
fn validate_candidate(
    candidate: &Path,
    source: &Path,
    core_table: &str,
) -> CoreResult<(Vec<String>, u64)> {
    let invalid = |reason: String| CoreError::ImportValidation {
        path: source.to_path_buf(),
        reason,
    };

    let session = Session::open(candidate)
        .map_err(|e| invalid(format!("candidate database cannot be opened: {e}")))?;
    let conn = session.connection();
    match schema::quick_check(conn) {
        Ok(None) => {}
        Ok(Some(problem)) => return Err(invalid(format!("integrity check failed: {problem}"))),
        Err(e) => return Err(invalid(format!("not a readable SQLite database: {e}"))),
    }
    if !schema::table_exists(conn, core_table)? {
        return Err(invalid(format!("required table '{core_table}' is missing")));
    }

    let tables = schema::list_tables(conn)?;
    let mut rows = 0;
    for table in &tables {
        rows += schema::row_count(conn, table)?;
    }
    session.close()?;
    Ok((tables, rows))
}
