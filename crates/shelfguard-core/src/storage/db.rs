//! Database session management
//!
//! A [`Session`] is opened for one operation and dropped at its end; there is
//! no process-wide handle.

use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// An open connection to one database file
#[derive(Debug)]
pub struct Session {
    conn: Connection,
    path: PathBuf,
}

impl Session {
    /// Open an existing database for reading and writing
    ///
    /// # Errors
    /// Returns `Io` if the file does not exist, or a SQLite error
    pub fn open(path: &Path) -> CoreResult<Self> {
        if !path.is_file() {
            return Err(CoreError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "database file not found"),
            ));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::configure(&conn)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open a database, creating an empty one if the file does not exist
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or created
    pub fn create(path: &Path) -> CoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::configure(&conn)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing database without write access
    ///
    /// # Errors
    /// Returns `Io` if the file does not exist, or a SQLite error
    pub fn open_read_only(path: &Path) -> CoreResult<Self> {
        if !path.is_file() {
            return Err(CoreError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "database file not found"),
            ));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    fn configure(conn: &Connection) -> CoreResult<()> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        // Rollback journal keeps every committed change inside the main file,
        // so a byte copy of that file is a complete database.
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "DELETE", |row| row.get(0))?;
        tracing::trace!(journal_mode = %mode, "session configured");
        Ok(())
    }

    /// Get a reference to the connection
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Get a mutable reference to the connection (for transactions)
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Path of the database file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the session, reporting any error from the final close
    ///
    /// # Errors
    /// Returns an error if SQLite fails to close the connection cleanly
    pub fn close(self) -> CoreResult<()> {
        self.conn.close().map_err(|(_, e)| CoreError::Sqlite(e))
    }
}
