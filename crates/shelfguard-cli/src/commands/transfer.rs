//! Export and import commands

use anyhow::Result;
use clap::{Args, ValueEnum};
use shelfguard_core::{Settings, TransferEngine, TransferFormat, TransferManifest};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use super::print_json;

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum FormatArg {
    /// Byte copy of the SQLite file
    Native,
    /// Replayable SQL script
    SqlScript,
    /// Directory with one CSV file per table
    Tabular,
}

impl From<FormatArg> for TransferFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Native => Self::Native,
            FormatArg::SqlScript => Self::SqlScript,
            FormatArg::Tabular => Self::Tabular,
        }
    }
}

#[derive(Args)]
pub struct ExportArgs {
    /// Export format
    #[arg(short, long, value_enum, default_value = "native")]
    pub format: FormatArg,

    /// Destination (defaults to <name>_export_<timestamp> in the project root)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the transfer manifest as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ImportArgs {
    /// Database file, SQL script, or directory of CSV files
    #[arg(value_name = "INPUT_PATH")]
    pub input: PathBuf,

    /// Do not back up the current database first
    #[arg(long)]
    pub no_backup: bool,

    /// Back up without asking
    #[arg(short, long, conflicts_with = "no_backup")]
    pub yes: bool,

    /// Print the transfer manifest as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn export(settings: &Settings, args: &ExportArgs) -> Result<ExitCode> {
    let format = TransferFormat::from(args.format);
    let engine = TransferEngine::new(settings);
    let destination = args
        .output
        .clone()
        .unwrap_or_else(|| engine.default_destination(format));

    let manifest = engine.export(&destination, format)?;

    if args.json {
        print_json(&manifest)?;
    } else {
        print_summary("Exported", &manifest);
    }
    Ok(ExitCode::SUCCESS)
}

pub fn import(settings: &Settings, args: &ImportArgs) -> Result<ExitCode> {
    // Skipping the backup takes an explicit --no-backup; declining cancels.
    let take_backup = if args.no_backup {
        false
    } else if args.yes || !settings.database_path().is_file() {
        true
    } else if confirm_backup(&mut io::stdin().lock())? {
        true
    } else {
        println!("Import cancelled, the current database was not changed");
        return Ok(ExitCode::SUCCESS);
    };

    let manifest = TransferEngine::new(settings).import(&args.input, take_backup)?;

    if args.json {
        print_json(&manifest)?;
    } else {
        print_summary("Imported", &manifest);
        match &manifest.backup {
            Some(path) => println!("Previous database backed up to {}", path.display()),
            None => println!("No backup was taken"),
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(verb: &str, manifest: &TransferManifest) {
    println!(
        "{verb} {} table(s), {} row(s) as {}",
        manifest.tables.len(),
        manifest.rows,
        manifest.format
    );
    println!("  From: {}", manifest.source.display());
    println!("  To:   {}", manifest.destination.display());
}

/// Ask whether to back up first. An empty answer means yes.
fn confirm_backup(input: &mut impl BufRead) -> Result<bool> {
    eprint!("Create a backup of the current database first? [Y/n] ");
    io::stderr().flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(parse_answer(&answer))
}

fn parse_answer(answer: &str) -> bool {
    let answer = answer.trim();
    answer.is_empty() || answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert!(parse_answer("\n"));
        assert!(parse_answer("Y\n"));
        assert!(parse_answer("yes"));
        assert!(!parse_answer("n\n"));
        assert!(!parse_answer("No"));
    }
}
