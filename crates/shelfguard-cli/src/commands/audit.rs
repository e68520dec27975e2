//! Audit command

use anyhow::Result;
use clap::Args;
use shelfguard_audit::output::{to_json, to_text};
use shelfguard_audit::Auditor;
use shelfguard_core::Settings;
use std::process::ExitCode;

#[derive(Args)]
pub struct AuditArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Exits 1 when anything was found
pub fn run(settings: &Settings, args: &AuditArgs) -> Result<ExitCode> {
    let auditor = Auditor::new(settings.audit.clone());
    let report = auditor.audit(&settings.root, &settings.database_path())?;

    if args.json {
        println!("{}", to_json(&report)?);
    } else {
        print!("{}", to_text(&report));
    }

    Ok(if report.has_findings() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
