//! Utility functions shared by the backup, migration and transfer code

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

const COPY_CHUNK: usize = 64 * 1024;

/// Errors related to name validation
#[derive(Error, Debug)]
pub enum NameError {
    #[error("Empty name")]
    Empty,

    #[error("Invalid character {1:?} in name: {0}")]
    InvalidCharacter(String, char),

    #[error("Not a plain SQL identifier: {0}")]
    NotIdentifier(String),
}

/// Validate a name used inside file names (logical names, operation tags).
/// Only ASCII letters, digits, `_` and `-` are allowed.
///
/// # Errors
/// Returns an error if the name is empty or contains other characters
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(NameError::InvalidCharacter(name.to_string(), c));
    }
    Ok(())
}

/// Validate a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`)
///
/// # Errors
/// Returns an error if the identifier has any other shape
pub fn validate_identifier(ident: &str) -> Result<(), NameError> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => return Err(NameError::Empty),
    };
    if valid {
        Ok(())
    } else {
        Err(NameError::NotIdentifier(ident.to_string()))
    }
}

/// Quote an identifier for SQLite
#[must_use]
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Timestamp used in backup and export file names
#[must_use]
pub fn timestamp_slug(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// SHA256 of a file's contents, hex encoded
///
/// # Errors
/// Returns an error if the file cannot be read
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Size and digest of a verified copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub bytes: u64,
    pub sha256: String,
}

/// Copy `src` into a new temporary file inside `dest_dir`, then re-read the
/// copy from disk and check its size and SHA256 against the source.
///
/// The caller decides how to move the temporary file into place. Dropping it
/// removes it, so an error here never leaves a partial copy behind.
///
/// # Errors
/// Returns an error if reading, writing, or verification fails
pub fn copy_to_temp(
    src: &Path,
    dest_dir: &Path,
    progress: &mut dyn FnMut(u64, u64),
) -> io::Result<(NamedTempFile, CopyOutcome)> {
    let mut reader = BufReader::new(File::open(src)?);
    let total = reader.get_ref().metadata()?.len();

    let mut temp = NamedTempFile::new_in(dest_dir)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut copied: u64 = 0;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        temp.write_all(&buf[..n])?;
        copied += n as u64;
        progress(copied, total);
    }
    temp.flush()?;
    temp.as_file().sync_all()?;

    let source_hash = hex::encode(hasher.finalize());
    let copy_len = temp.as_file().metadata()?.len();
    if copy_len != copied || copied != total {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("size mismatch: source {total} bytes, copy {copy_len} bytes"),
        ));
    }
    let copy_hash = sha256_file(temp.path())?;
    if copy_hash != source_hash {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("checksum mismatch: source {source_hash}, copy {copy_hash}"),
        ));
    }

    Ok((
        temp,
        CopyOutcome {
            bytes: copied,
            sha256: source_hash,
        },
    ))
}

/// Directory a path lives in, treating a bare file name as the current dir
#[must_use]
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
