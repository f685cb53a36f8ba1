//! Filesystem bridge operations performed on behalf of the UI.
//!
//! These are synchronous best-effort helpers; the daemon maps their
//! errors onto `error` frames.

use std::fs;
use std::io;
use std::path::Path;

/// A directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub is_directory: bool,
}

/// Write `content` to `path`, creating parent directories.
///
/// # Errors
/// Returns the underlying I/O error.
pub fn write_file(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

/// Read `path` as UTF-8 text.
///
/// # Errors
/// Returns the underlying I/O error.
pub fn read_file(path: &Path) -> io::Result<String> {
    fs::read_to_string(path)
}

/// Create a directory (and parents) at `path`.
///
/// # Errors
/// Returns the underlying I/O error.
pub fn make_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

/// List the entries of the directory at `path`, sorted by name.
///
/// # Errors
/// Returns the underlying I/O error.
pub fn read_dir(path: &Path) -> io::Result<Vec<ListEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let is_directory = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        entries.push(ListEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_directory,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
