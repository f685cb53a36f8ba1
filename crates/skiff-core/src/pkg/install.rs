//! `node_modules` installation.
//!
//! Packages are installed in bounded-parallel batches of four: download
//! the tarball, extract it, then materialize bin stubs. The
//! cancellation token is checked at every batch boundary. Per-package
//! failures are reported and counted without aborting siblings.

use super::error::PkgError;
use super::registry::RegistryClient;
use super::resolve::ResolvedPackage;
use super::tarball::extract_tarball;
use crate::sink::Sink;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Concurrent package installs per batch.
const BATCH_SIZE: usize = 4;

/// Outcome of an install run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Destination directory for a package under `node_modules`.
///
/// Scoped names nest: `node_modules/@scope/pkg`.
#[must_use]
pub fn package_dir(project_dir: &Path, name: &str) -> PathBuf {
    project_dir.join("node_modules").join(name)
}

/// Install every resolved package into `<project_dir>/node_modules`.
///
/// # Errors
/// Returns an error on cancellation or when `node_modules` itself
/// cannot be created; individual package failures are only counted.
pub async fn install_resolved(
    resolved: &BTreeMap<String, ResolvedPackage>,
    project_dir: &Path,
    client: &RegistryClient,
    cancel: &CancellationToken,
    sink: &Sink,
) -> Result<InstallReport, PkgError> {
    let node_modules = project_dir.join("node_modules");
    fs::create_dir_all(node_modules.join(".bin"))?;

    let mut report = InstallReport::default();
    let packages: Vec<&ResolvedPackage> = resolved.values().collect();

    for batch in packages.chunks(BATCH_SIZE) {
        if cancel.is_cancelled() {
            return Err(PkgError::canceled());
        }

        let outcomes = futures::future::join_all(
            batch
                .iter()
                .map(|pkg| install_one(pkg, project_dir, client)),
        )
        .await;

        for (pkg, outcome) in batch.iter().zip(outcomes) {
            match outcome {
                Ok(Outcome::Installed) => report.installed += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    sink.err_line(&format!(
                        "npm warn failed to install {}@{}: {}",
                        pkg.name, pkg.version, e
                    ));
                }
            }
        }
    }

    Ok(report)
}

enum Outcome {
    Installed,
    Skipped,
}

async fn install_one(
    pkg: &ResolvedPackage,
    project_dir: &Path,
    client: &RegistryClient,
) -> Result<Outcome, PkgError> {
    let dest = package_dir(project_dir, &pkg.name);

    if installed_version(&dest).as_deref() == Some(pkg.version.as_str()) {
        debug!(name = %pkg.name, version = %pkg.version, "already installed");
        return Ok(Outcome::Skipped);
    }

    if pkg.tarball.is_empty() {
        return Err(PkgError::download_failed("packument carries no tarball URL"));
    }

    let bytes = client.download_tarball(&pkg.tarball).await?;

    // A stale or partial previous install is replaced wholesale.
    if dest.exists() {
        let _ = fs::remove_dir_all(&dest);
    }
    extract_tarball(&bytes, &dest)?;

    write_bin_stubs(pkg, project_dir)?;

    debug!(name = %pkg.name, version = %pkg.version, "installed");
    Ok(Outcome::Installed)
}

/// The version recorded in an existing `<dest>/package.json`, if any.
fn installed_version(dest: &Path) -> Option<String> {
    let content = fs::read_to_string(dest.join("package.json")).ok()?;
    let json: serde_json::Value = serde_json::from_str(&content).ok()?;
    json.get("version")?.as_str().map(String::from)
}

/// Write executable stubs under `node_modules/.bin/`.
///
/// A stub is a two-line file: shebang plus a single require of the
/// target, relative to the `.bin` directory, so hosts that forbid
/// symlinks still work: the script runner reads the stub back instead
/// of executing it.
fn write_bin_stubs(pkg: &ResolvedPackage, project_dir: &Path) -> Result<(), PkgError> {
    let bin_dir = project_dir.join("node_modules").join(".bin");

    for (bin_name, target) in pkg.bin.entries(&pkg.name) {
        // Reject bin names that would write outside `.bin`.
        if bin_name.contains('/') || bin_name.contains("..") {
            continue;
        }
        let target = target.trim_start_matches("./");
        let stub_path = bin_dir.join(&bin_name);
        let body = format!("#!/usr/bin/env node\nrequire('../{}/{}');\n", pkg.name, target);
        fs::write(&stub_path, body)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&stub_path, fs::Permissions::from_mode(0o755));
        }
    }

    Ok(())
}

/// Parse the require target back out of a bin stub.
///
/// Returns the path relative to the `.bin` directory.
#[must_use]
pub fn parse_bin_stub(content: &str) -> Option<String> {
    let start = content.find("require('")? + "require('".len();
    let rest = &content[start..];
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}
