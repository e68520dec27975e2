//! Export of the live database

use chrono::Utc;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::dump::write_dump;
use super::tabular::write_tables;
use super::{TransferDirection, TransferEngine, TransferFormat, TransferManifest, TransferProgress};
use crate::error::{CoreError, CoreResult};
use crate::storage::{schema, OperationLock, Session};
use crate::util::{copy_to_temp, parent_dir};

impl TransferEngine<'_> {
    /// Default export destination under the project root
    #[must_use]
    pub fn default_destination(&self, format: TransferFormat) -> PathBuf {
        format.default_output(
            &self.settings.root,
            &self.settings.logical_name(),
            Utc::now(),
        )
    }

    /// Export the live database to `destination`
    ///
    /// # Errors
    /// See [`TransferEngine::export_with_progress`]
    pub fn export(
        &self,
        destination: &Path,
        format: TransferFormat,
    ) -> CoreResult<TransferManifest> {
        self.export_with_progress(destination, format, |_| {})
    }

    /// Export the live database, reporting progress to `progress`.
    ///
    /// The destination must not exist yet. For tabular exports it is a
    /// directory.
    ///
    /// # Errors
    /// Returns `Config` if the destination exists, `Busy` if another
    /// operation holds the lock, `Io` if the live database is missing, or
    /// `Transfer` if writing the artifact fails
    pub fn export_with_progress(
        &self,
        destination: &Path,
        format: TransferFormat,
        mut progress: impl FnMut(TransferProgress),
    ) -> CoreResult<TransferManifest> {
        if destination.exists() {
            return Err(CoreError::Config(format!(
                "export destination already exists: {}",
                destination.display()
            )));
        }

        let live = self.settings.database_path();
        let _lock = OperationLock::acquire(&self.settings.lock_path(), "export")?;
        let session = Session::open_read_only(&live)?;

        let dest_dir = parent_dir(destination);
        fs::create_dir_all(dest_dir).map_err(|e| CoreError::io(dest_dir, e))?;

        let mut manifest = TransferManifest::completed(
            TransferDirection::Export,
            format,
            live.clone(),
            destination.to_path_buf(),
        );

        match format {
            TransferFormat::Native => {
                let conn = session.connection();
                let tables = schema::list_tables(conn)?;
                let mut rows = 0;
                for table in &tables {
                    rows += schema::row_count(conn, table)?;
                }
                session.close()?;

                let (temp, outcome) = copy_to_temp(&live, dest_dir, &mut |copied, total| {
                    progress(TransferProgress::Bytes { copied, total });
                })
                .map_err(|e| CoreError::transfer("copy", e, None))?;
                temp.persist_noclobber(destination)
                    .map_err(|e| CoreError::transfer("rename", e.error, None))?;

                manifest.tables = tables;
                manifest.rows = rows;
                manifest.bytes = outcome.bytes;
            }
            TransferFormat::SqlScript => {
                let mut temp =
                    NamedTempFile::new_in(dest_dir).map_err(|e| CoreError::io(dest_dir, e))?;
                let stats = {
                    let mut writer = BufWriter::new(&mut temp);
                    let stats = write_dump(session.connection(), &mut writer, &mut progress)
                        .map_err(|e| CoreError::transfer("dump", e, None))?;
                    writer
                        .flush()
                        .map_err(|e| CoreError::transfer("dump", e, None))?;
                    stats
                };
                session.close()?;
                temp.as_file()
                    .sync_all()
                    .map_err(|e| CoreError::transfer("dump", e, None))?;
                let file = temp
                    .persist_noclobber(destination)
                    .map_err(|e| CoreError::transfer("rename", e.error, None))?;

                manifest.tables = stats.tables;
                manifest.rows = stats.rows;
                manifest.bytes = file
                    .metadata()
                    .map_err(|e| CoreError::io(destination, e))?
                    .len();
            }
            TransferFormat::Tabular => {
                let staging = tempfile::Builder::new()
                    .prefix(".shelfguard-export")
                    .tempdir_in(dest_dir)
                    .map_err(|e| CoreError::io(dest_dir, e))?;
                let stats = write_tables(session.connection(), staging.path(), &mut progress)
                    .map_err(|e| CoreError::transfer("csv", e, None))?;
                session.close()?;
                fs::rename(staging.path(), destination)
                    .map_err(|e| CoreError::transfer("rename", e, None))?;

                manifest.tables = stats.tables;
                manifest.rows = stats.rows;
                manifest.bytes = stats.bytes;
            }
        }

        manifest.completed_at = Utc::now();
        tracing::info!(
            id = %manifest.id,
            format = %format,
            destination = %destination.display(),
            tables = manifest.tables.len(),
            rows = manifest.rows,
            "export complete"
        );
        Ok(manifest)
    }
}
