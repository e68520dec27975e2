//! Migration state machine
//!
//! `NotStarted -> BackedUp -> Altered -> Verified -> Done`, with `Failed`
//! reachable from every non-terminal state. A failure before commit rolls
//! the transaction back; a failure during verification leaves the committed
//! change in place and reports the backup to restore from.

use rusqlite::Transaction;
use serde::Serialize;
use std::fmt;
use std::path::Path;

use super::descriptor::{Descriptor, SchemaChange};
use crate::backup::{BackupManager, BackupRecord};
use crate::config::Settings;
use crate::error::{CoreError, CoreResult};
use crate::storage::{lock_path_for, schema, OperationLock, Session};

/// States a migration passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    NotStarted,
    BackedUp,
    Altered,
    Verified,
    Done,
    Failed,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::BackedUp => "backed_up",
            Self::Altered => "altered",
            Self::Verified => "verified",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of a successful `apply`
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub descriptor: String,
    pub state: MigrationState,
    /// True when the change was already present and nothing was done
    pub already_applied: bool,
    pub backup: Option<BackupRecord>,
    /// Rows in the target table after verification
    pub rows_verified: u64,
    /// Every state visited, in order
    pub transitions: Vec<MigrationState>,
}

struct Transitions<'a> {
    descriptor: &'a str,
    visited: Vec<MigrationState>,
}

impl<'a> Transitions<'a> {
    fn new(descriptor: &'a str) -> Self {
        Self {
            descriptor,
            visited: vec![MigrationState::NotStarted],
        }
    }

    fn advance(&mut self, state: MigrationState) {
        tracing::debug!(descriptor = self.descriptor, %state, "migration state");
        self.visited.push(state);
    }
}

/// Applies schema change descriptors to a database session
#[derive(Debug, Clone)]
pub struct Migrator {
    backups: BackupManager,
}

impl Migrator {
    /// Create a migrator that writes backups through `backups`
    #[must_use]
    pub fn new(backups: BackupManager) -> Self {
        Self { backups }
    }

    /// Migrator using the configured backups directory
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(BackupManager::from_settings(settings))
    }

    /// Whether the change is already present. Reads schema metadata only.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be queried
    pub fn check_applied(&self, session: &Session, descriptor: &Descriptor) -> CoreResult<bool> {
        let conn = session.connection();
        let applied = match &descriptor.change {
            SchemaChange::AddColumn { table, column, .. } => {
                schema::table_exists(conn, table)? && schema::has_column(conn, table, column)?
            }
            SchemaChange::CreateTable { table, .. } => schema::table_exists(conn, table)?,
            _ => false,
        };
        Ok(applied)
    }

    /// Apply a descriptor.
    ///
    /// # Errors
    /// - `RefusedChange` for drop/rename descriptors or unsafe SQL fragments,
    ///   before anything is touched
    /// - `Config` for an invalid descriptor name or identifier
    /// - `Busy` if another exclusive operation is running
    /// - `Backup` if the pre-change backup cannot be taken
    /// - `Migration` if the alteration fails (rolled back)
    /// - `Verification` if the committed change does not check out
    pub fn apply(
        &self,
        session: &mut Session,
        descriptor: &Descriptor,
    ) -> CoreResult<MigrationResult> {
        let statement = Self::prepare(descriptor)?;
        let _lock = OperationLock::acquire(&lock_path_for(session.path()), "migrate")?;
        self.apply_locked(session, descriptor, &statement)
    }

    /// Apply a descriptor to the database at `database`. The session is
    /// opened only after the lock is held, so no other operation can swap
    /// the file underneath it.
    ///
    /// # Errors
    /// Same as [`Migrator::apply`], plus any error opening the database
    pub fn apply_at(&self, database: &Path, descriptor: &Descriptor) -> CoreResult<MigrationResult> {
        let statement = Self::prepare(descriptor)?;
        let _lock = OperationLock::acquire(&lock_path_for(database), "migrate")?;
        let mut session = Session::open(database)?;
        let result = self.apply_locked(&mut session, descriptor, &statement)?;
        session.close()?;
        Ok(result)
    }

    // Refusal and validation, before anything is touched
    fn prepare(descriptor: &Descriptor) -> CoreResult<String> {
        let name = descriptor.name.as_str();
        if let Some(reason) = descriptor.change.refusal_reason() {
            tracing::warn!(descriptor = name, %reason, "refusing change");
            return Err(CoreError::RefusedChange {
                descriptor: name.to_string(),
                reason,
            });
        }
        descriptor
            .validate()
            .map_err(|e| CoreError::Config(format!("descriptor name: {e}")))?;
        descriptor
            .change
            .statement()
            .map_err(|e| CoreError::Config(format!("descriptor '{name}': {e}")))
    }

    fn apply_locked(
        &self,
        session: &mut Session,
        descriptor: &Descriptor,
        statement: &str,
    ) -> CoreResult<MigrationResult> {
        let name = descriptor.name.as_str();
        let mut transitions = Transitions::new(name);
        let db_path = session.path().to_path_buf();

        let table = descriptor.change.table();
        if self.check_applied(session, descriptor)? {
            let rows_verified = schema::row_count(session.connection(), table)?;
            tracing::info!(descriptor = name, "{}", descriptor.already_applied_message());
            transitions.advance(MigrationState::Done);
            return Ok(MigrationResult {
                descriptor: name.to_string(),
                state: MigrationState::Done,
                already_applied: true,
                backup: None,
                rows_verified,
                transitions: transitions.visited,
            });
        }

        let rows_before = if schema::table_exists(session.connection(), table)? {
            schema::row_count(session.connection(), table)?
        } else {
            0
        };

        let backup = self
            .backups
            .create_backup(&db_path, &format!("before_{name}"))?;
        transitions.advance(MigrationState::BackedUp);

        let migration_failed = |message: String| CoreError::Migration {
            descriptor: name.to_string(),
            message,
            backup: backup.path.clone(),
        };

        let tx = session
            .connection_mut()
            .transaction()
            .map_err(|e| migration_failed(e.to_string()))?;
        if let Err(e) = alter(&tx, statement, descriptor.change.backfill()) {
            transitions.advance(MigrationState::Failed);
            if let Err(rollback) = tx.rollback() {
                tracing::warn!(descriptor = name, error = %rollback, "rollback reported an error");
            }
            tracing::error!(descriptor = name, error = %e, "alteration failed, rolled back");
            return Err(migration_failed(e.to_string()));
        }
        transitions.advance(MigrationState::Altered);
        if let Err(e) = tx.commit() {
            transitions.advance(MigrationState::Failed);
            return Err(migration_failed(format!("commit failed: {e}")));
        }

        let rows_verified = match self.verify(session, descriptor, rows_before) {
            Ok(rows) => rows,
            Err(message) => {
                transitions.advance(MigrationState::Failed);
                tracing::error!(descriptor = name, %message, "verification failed");
                return Err(CoreError::Verification {
                    descriptor: name.to_string(),
                    message,
                    backup: backup.path,
                });
            }
        };
        transitions.advance(MigrationState::Verified);
        transitions.advance(MigrationState::Done);

        tracing::info!(
            descriptor = name,
            backup = %backup.path.display(),
            rows = rows_verified,
            "migration applied"
        );

        Ok(MigrationResult {
            descriptor: name.to_string(),
            state: MigrationState::Done,
            already_applied: false,
            backup: Some(backup),
            rows_verified,
            transitions: transitions.visited,
        })
    }

    fn verify(
        &self,
        session: &Session,
        descriptor: &Descriptor,
        rows_before: u64,
    ) -> Result<u64, String> {
        let conn = session.connection();
        let table = descriptor.change.table();

        if !self
            .check_applied(session, descriptor)
            .map_err(|e| e.to_string())?
        {
            return Err(format!("change not visible in table '{table}' after commit"));
        }

        let rows_after = schema::row_count(conn, table).map_err(|e| e.to_string())?;
        if rows_after != rows_before {
            return Err(format!(
                "row count changed from {rows_before} to {rows_after}"
            ));
        }

        if let (Some(_), Some(column)) = (
            descriptor.change.default_value(),
            descriptor.change.added_column(),
        ) {
            let nulls = schema::null_count(conn, table, column).map_err(|e| e.to_string())?;
            if nulls > 0 {
                return Err(format!("{nulls} NULL value(s) in column '{column}'"));
            }
        }

        Ok(rows_after)
    }
}

// One statement each; `execute` never runs a trailing second statement
fn alter(tx: &Transaction<'_>, statement: &str, backfill: Option<&str>) -> rusqlite::Result<()> {
    tx.execute(statement, [])?;
    if let Some(backfill) = backfill {
        tx.execute(backfill, [])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::find_builtin;
    use rusqlite::Connection;
    use std::path::Path;
    use tempfile::TempDir;

    fn reading_db(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            r"
            CREATE TABLE read (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                date_started DATE,
                days_estimate INTEGER,
                date_finished_actual DATE
            );
            INSERT INTO read (title, date_started, days_estimate, date_finished_actual)
            VALUES ('Dune', '2026-01-01', 10, NULL),
                   ('Emma', '2026-02-01', 5, '2026-02-04'),
                   ('Ulysses', NULL, NULL, NULL);
            ",
        )
        .unwrap();
    }

    fn setup() -> (TempDir, Migrator, Session) {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("reading_list.db");
        reading_db(&db);
        let migrator = Migrator::new(BackupManager::new(dir.path().join("backups"), "reading_list"));
        let session = Session::open(&db).unwrap();
        (dir, migrator, session)
    }

    #[test]
    fn test_full_transition_sequence() {
        let (_dir, migrator, mut session) = setup();
        let descriptor = find_builtin("date_est_start").unwrap();

        let result = migrator.apply(&mut session, &descriptor).unwrap();
        assert_eq!(
            result.transitions,
            vec![
                MigrationState::NotStarted,
                MigrationState::BackedUp,
                MigrationState::Altered,
                MigrationState::Verified,
                MigrationState::Done,
            ]
        );
        assert_eq!(result.rows_verified, 3);
        assert!(result.backup.unwrap().path.exists());
    }

    #[test]
    fn test_backfill_sets_estimated_end_for_unfinished() {
        let (_dir, migrator, mut session) = setup();
        migrator
            .apply(&mut session, &find_builtin("date_est_end").unwrap())
            .unwrap();

        let ends: Vec<Option<String>> = session
            .connection()
            .prepare("SELECT date_est_end FROM read ORDER BY id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ends, vec![Some("2026-01-11".to_string()), None, None]);
    }

    #[test]
    fn test_failing_backfill_rolls_back() {
        let (_dir, migrator, mut session) = setup();
        let descriptor = Descriptor::add_column("broken", "read", "extra", "TEXT")
            .with_backfill("UPDATE read SET no_such_column = 1");

        let err = migrator.apply(&mut session, &descriptor).unwrap_err();
        assert_eq!(err.code(), "MIGRATION_FAILURE");
        assert!(err.backup_path().unwrap().exists());
        assert!(!schema::has_column(session.connection(), "read", "extra").unwrap());
    }

    #[test]
    fn test_nulls_after_commit_fail_verification() {
        let (_dir, migrator, mut session) = setup();
        let descriptor = Descriptor::add_column("flag", "read", "flag", "BOOLEAN")
            .with_default("FALSE")
            .with_backfill("UPDATE read SET flag = NULL WHERE id = 1");

        let err = migrator.apply(&mut session, &descriptor).unwrap_err();
        assert_eq!(err.code(), "VERIFICATION_FAILURE");
        // committed change is left in place
        assert!(schema::has_column(session.connection(), "read", "flag").unwrap());
    }

    #[test]
    fn test_refused_before_any_backup() {
        let (dir, migrator, mut session) = setup();
        let descriptor = Descriptor {
            name: "drop_read".to_string(),
            change: SchemaChange::DropTable {
                table: "read".to_string(),
            },
        };
        let err = migrator.apply(&mut session, &descriptor).unwrap_err();
        assert_eq!(err.code(), "REFUSED_CHANGE");
        assert!(!dir.path().join("backups").exists());
    }

    #[test]
    fn test_destructive_backfill_refused() {
        let (dir, migrator, mut session) = setup();
        session
            .connection()
            .execute_batch("CREATE TABLE inventory (id INTEGER PRIMARY KEY);")
            .unwrap();
        let descriptor = Descriptor::add_column("x", "read", "x", "TEXT")
            .with_backfill("DROP TABLE inventory");

        let err = migrator.apply(&mut session, &descriptor).unwrap_err();
        assert_eq!(err.code(), "REFUSED_CHANGE");
        assert!(schema::table_exists(session.connection(), "inventory").unwrap());
        assert!(!schema::has_column(session.connection(), "read", "x").unwrap());
        assert!(!dir.path().join("backups").exists());
    }

    #[test]
    fn test_apply_at_opens_database_under_lock() {
        let (_dir, migrator, session) = setup();
        let db = session.path().to_path_buf();
        session.close().unwrap();

        let result = migrator
            .apply_at(&db, &find_builtin("days_estimate_override").unwrap())
            .unwrap();
        assert_eq!(result.state, MigrationState::Done);
        assert!(!lock_path_for(&db).exists());

        let _held = OperationLock::acquire(&lock_path_for(&db), "import").unwrap();
        let err = migrator
            .apply_at(&db, &find_builtin("date_est_start").unwrap())
            .unwrap_err();
        assert_eq!(err.code(), "BUSY");
    }

    #[test]
    fn test_busy_when_lock_held() {
        let (_dir, migrator, mut session) = setup();
        let _held = OperationLock::acquire(&lock_path_for(session.path()), "import").unwrap();
        let err = migrator
            .apply(&mut session, &find_builtin("date_est_start").unwrap())
            .unwrap_err();
        assert_eq!(err.code(), "BUSY");
    }

    #[test]
    fn test_create_table_descriptor() {
        let (_dir, migrator, mut session) = setup();
        let descriptor =
            Descriptor::create_table("shelves", "shelf", "id INTEGER PRIMARY KEY, name TEXT");
        let first = migrator.apply(&mut session, &descriptor).unwrap();
        assert!(!first.already_applied);
        let second = migrator.apply(&mut session, &descriptor).unwrap();
        assert!(second.already_applied);
        assert!(second.backup.is_none());
    }
}
