//! Migrate command

use anyhow::{bail, Result};
use clap::Args;
use shelfguard_core::migrate::{builtin_descriptors, find_builtin};
use shelfguard_core::{Descriptor, Migrator, Session, Settings};
use std::process::ExitCode;

#[derive(Args)]
pub struct MigrateArgs {
    /// Migrations to apply (defaults to all, in order)
    #[arg(value_name = "NAME")]
    pub names: Vec<String>,

    /// List migrations and whether each is applied
    #[arg(long)]
    pub list: bool,
}

pub fn run(settings: &Settings, args: &MigrateArgs) -> Result<ExitCode> {
    let descriptors = select(&args.names)?;
    let db_path = settings.database_path();
    let migrator = Migrator::from_settings(settings);

    if args.list {
        let session = Session::open_read_only(&db_path)?;
        for descriptor in &descriptors {
            let status = if migrator.check_applied(&session, descriptor)? {
                "applied"
            } else {
                "pending"
            };
            println!("{status:8} {descriptor}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    for descriptor in &descriptors {
        let result = migrator.apply_at(&db_path, descriptor)?;
        if result.already_applied {
            println!("{}", descriptor.already_applied_message());
        } else {
            println!("Applied {descriptor}");
            if let Some(backup) = &result.backup {
                println!("  Backup: {}", backup.path.display());
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn select(names: &[String]) -> Result<Vec<Descriptor>> {
    if names.is_empty() {
        return Ok(builtin_descriptors());
    }
    let mut selected = Vec::with_capacity(names.len());
    for name in names {
        match find_builtin(name) {
            Some(descriptor) => selected.push(descriptor),
            None => {
                let known: Vec<String> = builtin_descriptors().into_iter().map(|d| d.name).collect();
                bail!("Unknown migration '{name}'. Available: {}", known.join(", "));
            }
        }
    }
    Ok(selected)
}
