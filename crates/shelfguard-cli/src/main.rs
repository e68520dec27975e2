//! shelfguard CLI - storage integrity tools for the reading-list database
//!
//! Provides `shelfguard export`, `import`, `migrate`, `audit`, and backup
//! management commands.

mod commands;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use shelfguard_core::{CoreError, Settings};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{audit, backup, migrate, transfer};

#[derive(Parser)]
#[command(name = "shelfguard")]
#[command(about = "Backups, schema migrations, export/import and audits for the reading-list database")]
#[command(version)]
struct Cli {
    /// Project root that relative paths are resolved against
    #[arg(long, global = true, value_name = "PATH")]
    root: Option<PathBuf>,

    /// Config file (defaults to $SHELFGUARD_CONFIG, then <root>/shelfguard.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More log output (repeatable)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// No log output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the live database
    Export(transfer::ExportArgs),
    /// Replace the live database with an exported copy
    Import(transfer::ImportArgs),
    /// Apply additive schema migrations
    Migrate(migrate::MigrateArgs),
    /// Look for stale references to the database
    Audit(audit::AuditArgs),
    /// Take a backup of the live database
    Backup(backup::BackupArgs),
    /// List backups
    Backups(backup::ListArgs),
    /// Restore the live database from a backup
    Restore(backup::RestoreArgs),
}

impl Commands {
    fn json(&self) -> bool {
        match self {
            Self::Export(args) => args.json,
            Self::Import(args) => args.json,
            Self::Audit(args) => args.json,
            Self::Backups(args) => args.json,
            Self::Migrate(_) | Self::Backup(_) | Self::Restore(_) => false,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            report_error(&e, cli.command.json());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let root = cli.root.clone().unwrap_or_else(|| PathBuf::from("."));
    tracing::debug!(root = %root.display(), config = ?cli.config, "loading settings");
    let settings = Settings::load(&root, cli.config.as_deref())?;

    match &cli.command {
        Commands::Export(args) => transfer::export(&settings, args),
        Commands::Import(args) => transfer::import(&settings, args),
        Commands::Migrate(args) => migrate::run(&settings, args),
        Commands::Audit(args) => audit::run(&settings, args),
        Commands::Backup(args) => backup::create(&settings, args),
        Commands::Backups(args) => backup::list(&settings, args),
        Commands::Restore(args) => backup::restore(&settings, args),
    }
}

fn report_error(e: &anyhow::Error, json: bool) {
    let core = e.downcast_ref::<CoreError>();
    if json {
        let error_json = serde_json::json!({
            "error": true,
            "code": core.map_or("ERROR", CoreError::code),
            "message": e.to_string(),
            "backup": core.and_then(CoreError::backup_path),
        });
        println!("{}", serde_json::to_string(&error_json).unwrap_or_default());
    } else {
        eprintln!("Error: {e:#}");
    }
}

fn init_tracing(cli: &Cli) {
    if cli.quiet {
        return;
    }

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info,shelfguard_core=debug,shelfguard_audit=debug",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
