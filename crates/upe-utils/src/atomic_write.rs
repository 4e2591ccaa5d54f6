//! Atomic file operations
//!
//! Writes go to a temporary file in the target directory, are fsynced, and
//! then renamed into place so readers never observe a partially written file.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;

use tempfile::NamedTempFile;

/// Whether an existing target may be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overwrite {
    Allow,
    Deny,
}

/// Outcome of an atomic write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Target already existed and `Overwrite::Deny` was requested
    AlreadyExists,
}

/// Atomically write content to a file using temp file + fsync + rename
///
/// Line endings are normalized to LF. With `Overwrite::Deny` the rename uses
/// a no-clobber persist, so two concurrent writers cannot both succeed.
pub fn write_file_atomic(
    path: &Utf8Path,
    content: &str,
    overwrite: Overwrite,
) -> Result<WriteOutcome> {
    let normalized_content = normalize_line_endings(content);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {parent}"))?;
    }

    if overwrite == Overwrite::Deny && path.exists() {
        return Ok(WriteOutcome::AlreadyExists);
    }

    let temp_dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp_file = NamedTempFile::new_in(temp_dir)
        .with_context(|| format!("Failed to create temporary file in: {temp_dir}"))?;

    temp_file
        .write_all(normalized_content.as_bytes())
        .with_context(|| "Failed to write content to temporary file")?;

    temp_file
        .as_file()
        .sync_all()
        .with_context(|| "Failed to fsync temporary file")?;

    match overwrite {
        Overwrite::Allow => {
            temp_file
                .persist(path.as_std_path())
                .map_err(|e| e.error)
                .with_context(|| format!("Failed to atomically write file: {path}"))?;
        }
        Overwrite::Deny => match temp_file.persist_noclobber(path.as_std_path()) {
            Ok(_) => {}
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                return Ok(WriteOutcome::AlreadyExists);
            }
            Err(e) => {
                return Err(e.error)
                    .with_context(|| format!("Failed to atomically write file: {path}"));
            }
        },
    }

    Ok(WriteOutcome::Written)
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}
