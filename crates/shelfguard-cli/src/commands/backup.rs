//! Backup, backup listing and restore commands

use anyhow::Result;
use clap::Args;
use shelfguard_core::backup::restore_backup;
use shelfguard_core::{BackupManager, Settings};
use std::path::PathBuf;
use std::process::ExitCode;

use super::print_json;

#[derive(Args)]
pub struct BackupArgs {
    /// Tag recorded in the backup file name
    #[arg(short, long, default_value = "manual")]
    pub tag: String,
}

#[derive(Args)]
pub struct ListArgs {
    /// Print backups as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct RestoreArgs {
    /// Backup file to restore
    #[arg(value_name = "BACKUP_PATH")]
    pub backup: PathBuf,

    /// Do not back up the current database first
    #[arg(long)]
    pub no_backup: bool,
}

pub fn create(settings: &Settings, args: &BackupArgs) -> Result<ExitCode> {
    let manager = BackupManager::from_settings(settings);
    let record = manager.create_backup(&settings.database_path(), &args.tag)?;
    println!("Backup created: {}", record.path.display());
    println!("  Size:   {} bytes", record.size_bytes);
    if let Some(sha) = &record.sha256 {
        println!("  SHA256: {sha}");
    }
    Ok(ExitCode::SUCCESS)
}

pub fn list(settings: &Settings, args: &ListArgs) -> Result<ExitCode> {
    let manager = BackupManager::from_settings(settings);
    let records = manager.list_backups()?;

    if args.json {
        print_json(&records)?;
        return Ok(ExitCode::SUCCESS);
    }

    if records.is_empty() {
        println!("No backups found in {}", manager.backup_dir().display());
        return Ok(ExitCode::SUCCESS);
    }
    println!("{:<20} {:<28} {:>12}  PATH", "CREATED", "TAG", "BYTES");
    for record in &records {
        println!(
            "{:<20} {:<28} {:>12}  {}",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.tag,
            record.size_bytes,
            record.path.display()
        );
    }
    Ok(ExitCode::SUCCESS)
}

pub fn restore(settings: &Settings, args: &RestoreArgs) -> Result<ExitCode> {
    let outcome = restore_backup(settings, &args.backup, !args.no_backup)?;
    println!(
        "Restored {} from {}",
        outcome.live.display(),
        outcome.restored_from.display()
    );
    if let Some(previous) = &outcome.previous_backup {
        println!("  Previous database backed up to {}", previous.path.display());
    }
    Ok(ExitCode::SUCCESS)
}
