//! CommonJS module resolution.
//!
//! Node resolution order, trimmed to what project scripts need: exact
//! file, `.js` / `.json` extensions, directory `package.json` `main`,
//! `index.*`, and a `node_modules` walk-up for bare specifiers. The
//! resolver runs on the Rust side; the bootstrap calls it through an op
//! so `require` inside user code resolves relative to the requiring
//! file's directory.

use std::path::{Component, Path, PathBuf};

/// Builtin modules the bootstrap implements in JavaScript.
pub const BUILTIN_MODULES: &[&str] = &["path", "fs", "os"];

/// Outcome of resolving a specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A bootstrap-provided builtin (`fs`, `path`, `os`).
    Builtin(String),
    /// A file on disk.
    File(PathBuf),
}

/// Resolve `specifier` as required from a module in `base_dir`.
///
/// # Errors
/// Returns `Cannot find module '<specifier>'` when nothing matches.
pub fn resolve_require(base_dir: &Path, specifier: &str) -> Result<Resolution, String> {
    let bare = specifier.strip_prefix("node:").unwrap_or(specifier);
    if BUILTIN_MODULES.contains(&bare) {
        return Ok(Resolution::Builtin(bare.to_string()));
    }

    let not_found = || format!("Cannot find module '{specifier}'");

    if specifier.starts_with("./") || specifier.starts_with("../") {
        let joined = normalize(&base_dir.join(specifier));
        return resolve_path(&joined).ok_or_else(not_found).map(Resolution::File);
    }

    if Path::new(specifier).is_absolute() {
        return resolve_path(Path::new(specifier))
            .ok_or_else(not_found)
            .map(Resolution::File);
    }

    // Bare specifier: walk up looking for node_modules/<name>.
    let mut dir = Some(base_dir);
    while let Some(current) = dir {
        let candidate = current.join("node_modules").join(specifier);
        if let Some(found) = resolve_path(&candidate) {
            return Ok(Resolution::File(found));
        }
        dir = current.parent();
    }

    Err(not_found())
}

/// Try a path as a file, with extensions, then as a package directory.
fn resolve_path(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }

    for ext in ["js", "json"] {
        let mut with_ext = path.as_os_str().to_owned();
        with_ext.push(".");
        with_ext.push(ext);
        let with_ext = PathBuf::from(with_ext);
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }

    if path.is_dir() {
        if let Some(main) = package_main(path) {
            let main_path = normalize(&path.join(main.trim_start_matches("./")));
            if let Some(found) = resolve_path(&main_path) {
                return Some(found);
            }
        }
        for index in ["index.js", "index.json"] {
            let index_path = path.join(index);
            if index_path.is_file() {
                return Some(index_path);
            }
        }
    }

    None
}

/// The `main` field of a directory's `package.json`.
fn package_main(dir: &Path) -> Option<String> {
    let content = std::fs::read_to_string(dir.join("package.json")).ok()?;
    let json: serde_json::Value = serde_json::from_str(&content).ok()?;
    json.get("main")?.as_str().map(String::from)
}

/// Collapse `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
