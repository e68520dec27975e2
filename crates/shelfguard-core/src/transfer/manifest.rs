//! Transfer manifests

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use super::TransferFormat;

/// Direction of a transfer relative to the live database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Export,
    Import,
}

/// Record of one completed transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferManifest {
    pub id: Uuid,
    pub direction: TransferDirection,
    pub format: TransferFormat,
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Backup of the live database taken before an import
    pub backup: Option<PathBuf>,
    /// Tables transferred, sorted by name
    pub tables: Vec<String>,
    /// Total rows across all tables
    pub rows: u64,
    /// Size of the written artifact in bytes
    pub bytes: u64,
    pub completed_at: DateTime<Utc>,
}

impl TransferManifest {
    pub(crate) fn completed(
        direction: TransferDirection,
        format: TransferFormat,
        source: PathBuf,
        destination: PathBuf,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            format,
            source,
            destination,
            backup: None,
            tables: Vec::new(),
            rows: 0,
            bytes: 0,
            completed_at: Utc::now(),
        }
    }

    /// Pretty JSON for logs and `--json` output
    ///
    /// # Errors
    /// Returns an error if serialization fails
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_json_fields() {
        let mut manifest = TransferManifest::completed(
            TransferDirection::Import,
            TransferFormat::SqlScript,
            PathBuf::from("dump.sql"),
            PathBuf::from("data/db/reading_list.db"),
        );
        manifest.backup = Some(PathBuf::from("backups/x.db"));
        manifest.tables = vec!["read".to_string()];
        manifest.rows = 12;

        let value: serde_json::Value = serde_json::from_str(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(value["direction"], "import");
        assert_eq!(value["format"], "sql-script");
        assert_eq!(value["backup"], "backups/x.db");
        assert_eq!(value["rows"], 12);
        assert_eq!(value["id"].as_str().unwrap().len(), 36);
    }
}
