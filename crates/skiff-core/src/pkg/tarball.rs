//! Tarball extraction.
//!
//! npm tarballs are gzip-compressed tar archives whose entries are
//! wrapped in a single root directory (usually `package/`). Extraction
//! strips that first path component and refuses anything that would
//! escape the destination.

use super::error::PkgError;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::Archive;

/// Extract a gzip-compressed tarball into `dest`.
///
/// The first path component of every entry is stripped. Directory
/// entries create directories, symlink entries are attempted and
/// tolerated on failure (some hosts forbid them), regular entries are
/// written with parent directories created as needed. Empty files
/// produce zero-byte outputs.
///
/// # Errors
/// Returns an error when the archive is malformed or an entry would
/// escape `dest` via `..` segments or an absolute path.
pub fn extract_tarball(bytes: &[u8], dest: &Path) -> Result<(), PkgError> {
    fs::create_dir_all(dest)?;

    let gz = GzDecoder::new(bytes);
    let mut archive = Archive::new(gz);

    for entry in archive
        .entries()
        .map_err(|e| PkgError::extract_failed(format!("failed to read tarball entries: {e}")))?
    {
        let mut entry = entry
            .map_err(|e| PkgError::extract_failed(format!("failed to read tarball entry: {e}")))?;

        // `path()` resolves ustar prefix fields, PAX `path=` overrides,
        // and GNU long-name entries.
        let raw_path = entry
            .path()
            .map_err(|e| PkgError::extract_failed(format!("failed to read entry path: {e}")))?
            .into_owned();

        let Some(stripped) = strip_root(&raw_path)? else {
            // The wrapper directory itself.
            continue;
        };

        let dest_path = dest.join(&stripped);
        if !dest_path.starts_with(dest) {
            return Err(PkgError::extract_failed(format!(
                "tarball entry escapes destination: {}",
                raw_path.display()
            )));
        }

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry_type.is_symlink() {
            write_symlink(&entry, &dest_path);
        } else if entry_type.is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&dest_path)?;
            io::copy(&mut entry, &mut file)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(mode) = entry.header().mode() {
                    let _ = fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode));
                }
            }
        }
        // Other entry types (fifos, devices, PAX globals) are skipped;
        // the tar crate already consumed extended headers.
    }

    Ok(())
}

/// Strip the wrapper directory from an entry path, rejecting traversal.
///
/// Returns `Ok(None)` when nothing remains after stripping.
fn strip_root(path: &Path) -> Result<Option<PathBuf>, PkgError> {
    if path.is_absolute() {
        return Err(PkgError::extract_failed(format!(
            "tarball contains absolute path: {}",
            path.display()
        )));
    }

    let mut out = PathBuf::new();
    let mut saw_root = false;
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(PkgError::extract_failed(format!(
                    "tarball contains path traversal: {}",
                    path.display()
                )));
            }
            Component::CurDir => {}
            Component::Normal(part) => {
                if saw_root {
                    out.push(part);
                } else {
                    // First real component is the wrapper directory.
                    saw_root = true;
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PkgError::extract_failed(format!(
                    "tarball contains absolute path: {}",
                    path.display()
                )));
            }
        }
    }

    if out.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(out))
    }
}

#[cfg(unix)]
fn write_symlink<R: io::Read>(entry: &tar::Entry<'_, R>, dest_path: &Path) {
    if let Ok(Some(target)) = entry.link_name() {
        if let Some(parent) = dest_path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let _ = fs::remove_file(dest_path);
        let _ = std::os::unix::fs::symlink(&target, dest_path);
    }
}

#[cfg(not(unix))]
fn write_symlink<R: io::Read>(_entry: &tar::Entry<'_, R>, _dest_path: &Path) {}
