//! Settings loading
//!
//! Precedence, lowest first: built-in defaults, the TOML file, then
//! `SHELFGUARD_DATABASE` / `SHELFGUARD_BACKUPS` environment overrides.

use serde::{Deserialize, Serialize};
use shelfguard_audit::AuditRules;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// Config file looked up in the project root when no explicit path is given
pub const CONFIG_FILE_NAME: &str = "shelfguard.toml";

const DEFAULT_DATABASE: &str = "data/db/reading_list.db";
const DEFAULT_BACKUPS: &str = "backups";
const DEFAULT_CORE_TABLE: &str = "read";

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Project root every relative path is resolved against
    #[serde(skip)]
    pub root: PathBuf,
    pub paths: PathSettings,
    pub backup: BackupSettings,
    pub transfer: TransferSettings,
    pub audit: AuditRules,
}

/// `[paths]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Live database file
    pub database: PathBuf,
    /// Directory holding backup records
    pub backups: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            backups: PathBuf::from(DEFAULT_BACKUPS),
        }
    }
}

/// `[backup]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Name prefix for backup files; defaults to the database file stem
    pub logical_name: Option<String>,
}

/// `[transfer]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Table an import candidate must contain to be accepted
    pub core_table: String,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            core_table: DEFAULT_CORE_TABLE.to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            paths: PathSettings::default(),
            backup: BackupSettings::default(),
            transfer: TransferSettings::default(),
            audit: AuditRules::default(),
        }
    }
}

impl Settings {
    /// Defaults for a project root, without reading files or environment
    #[must_use]
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load settings for a project root.
    ///
    /// The config file is `explicit` if given, else `$SHELFGUARD_CONFIG`,
    /// else `<root>/shelfguard.toml` when it exists.
    ///
    /// # Errors
    /// Returns an error if an explicitly named config file is missing or
    /// any config file fails to parse
    pub fn load(root: &Path, explicit: Option<&Path>) -> CoreResult<Self> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("SHELFGUARD_CONFIG").map(PathBuf::from));

        let mut settings = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(CoreError::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                Self::from_file(&path)?
            }
            None => {
                let project = root.join(CONFIG_FILE_NAME);
                if project.is_file() {
                    Self::from_file(&project)?
                } else {
                    Self::default()
                }
            }
        };
        settings.root = root.to_path_buf();
        settings.apply_env_overrides();
        settings.sync_audit_path();
        settings.validate()?;

        tracing::debug!(
            root = %settings.root.display(),
            database = %settings.database_path().display(),
            backups = %settings.backups_dir().display(),
            "settings loaded"
        );
        Ok(settings)
    }

    /// Parse a TOML config file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        Self::from_toml(&raw)
            .map_err(|e| CoreError::Config(format!("parse config {}: {e}", path.display())))
    }

    /// Parse settings from TOML text
    ///
    /// # Errors
    /// Returns an error if the text is not valid settings TOML
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(db) = std::env::var_os("SHELFGUARD_DATABASE") {
            self.paths.database = PathBuf::from(db);
        }
        if let Some(dir) = std::env::var_os("SHELFGUARD_BACKUPS") {
            self.paths.backups = PathBuf::from(dir);
        }
    }

    // The audit checks for the configured database path unless the config
    // names a different one explicitly.
    fn sync_audit_path(&mut self) {
        let default_rules = AuditRules::default();
        if self.audit.database_path == default_rules.database_path
            && self.paths.database != Path::new(DEFAULT_DATABASE)
            && self.paths.database.is_relative()
        {
            self.audit.database_path = self.paths.database.to_string_lossy().replace('\\', "/");
        }
    }

    fn validate(&self) -> CoreResult<()> {
        if self.paths.database.as_os_str().is_empty() {
            return Err(CoreError::Config("paths.database must not be empty".into()));
        }
        if self.transfer.core_table.trim().is_empty() {
            return Err(CoreError::Config(
                "transfer.core_table must not be empty".into(),
            ));
        }
        if let Some(name) = &self.backup.logical_name {
            crate::util::validate_name(name)
                .map_err(|e| CoreError::Config(format!("backup.logical_name: {e}")))?;
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Absolute path of the live database file
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.paths.database)
    }

    /// Absolute path of the backups directory
    #[must_use]
    pub fn backups_dir(&self) -> PathBuf {
        self.resolve(&self.paths.backups)
    }

    /// Lock file guarding exclusive operations on the live database
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        crate::storage::lock_path_for(&self.database_path())
    }

    /// Name prefix for backup and export files
    #[must_use]
    pub fn logical_name(&self) -> String {
        self.backup.logical_name.clone().unwrap_or_else(|| {
            self.paths
                .database
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|s| crate::util::validate_name(s).is_ok())
                .unwrap_or("database")
                .to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve_against_root() {
        let settings = Settings::for_root("/srv/reading");
        assert_eq!(
            settings.database_path(),
            PathBuf::from("/srv/reading/data/db/reading_list.db")
        );
        assert_eq!(settings.backups_dir(), PathBuf::from("/srv/reading/backups"));
        assert_eq!(
            settings.lock_path(),
            PathBuf::from("/srv/reading/data/db/reading_list.db.lock")
        );
        assert_eq!(settings.logical_name(), "reading_list");
        assert_eq!(settings.transfer.core_table, "read");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
            [paths]
            backups = "/var/backups/reading"

            [audit]
            retired_identifiers = ["readings", "reading_log"]
            "#,
        )
        .unwrap();
        assert_eq!(settings.paths.database, PathBuf::from(DEFAULT_DATABASE));
        assert_eq!(settings.paths.backups, PathBuf::from("/var/backups/reading"));
        assert_eq!(settings.audit.retired_identifiers.len(), 2);
        assert_eq!(settings.audit.connection_prefix, "sqlite:///");
    }

    #[test]
    fn test_absolute_paths_are_not_rejoined() {
        let mut settings = Settings::for_root("/srv/reading");
        settings.paths.database = PathBuf::from("/data/live.db");
        assert_eq!(settings.database_path(), PathBuf::from("/data/live.db"));
        assert_eq!(settings.logical_name(), "live");
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Settings::from_toml("[paths\ndatabase = 1").is_err());
    }

    #[test]
    fn test_invalid_logical_name_rejected() {
        let mut settings = Settings::for_root("/srv");
        settings.backup.logical_name = Some("../escape".to_string());
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_audit_path_follows_database_path() {
        let mut settings = Settings::for_root("/srv");
        settings.paths.database = PathBuf::from("store/books.db");
        settings.sync_audit_path();
        assert_eq!(settings.audit.database_path, "store/books.db");
    }
}
