//! CLI command handlers
//!
//! Each handler takes the loaded settings and its parsed arguments and
//! returns the process exit code.

pub mod audit;
pub mod backup;
pub mod migrate;
pub mod transfer;

use anyhow::Result;
use serde::Serialize;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
