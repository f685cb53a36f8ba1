//! Package bin resolution for `npx` and script commands.

use crate::loader::normalize;
use skiff_core::pkg::parse_bin_stub;
use std::path::{Path, PathBuf};

/// Resolve a bin name to the script it should run.
///
/// Checks `node_modules/.bin/<name>` first and reads the require
/// target back out of the generated stub; otherwise falls back to the
/// package's own `bin` mapping or `main` field.
#[must_use]
pub fn resolve_bin(cwd: &Path, name: &str) -> Option<PathBuf> {
    let bin_dir = cwd.join("node_modules").join(".bin");
    let stub_path = bin_dir.join(name);

    if let Ok(content) = std::fs::read_to_string(&stub_path) {
        if let Some(target) = parse_bin_stub(&content) {
            return Some(normalize(&bin_dir.join(target)));
        }
        // Not one of our stubs; run the file itself.
        return Some(stub_path);
    }

    // Fall back to node_modules/<name>/package.json.
    let pkg_dir = cwd.join("node_modules").join(name);
    let content = std::fs::read_to_string(pkg_dir.join("package.json")).ok()?;
    let json: serde_json::Value = serde_json::from_str(&content).ok()?;

    let target = match json.get("bin") {
        Some(serde_json::Value::String(path)) => Some(path.clone()),
        Some(serde_json::Value::Object(map)) => {
            let short = name.rsplit('/').next().unwrap_or(name);
            map.get(name)
                .or_else(|| map.get(short))
                .or_else(|| map.values().next())
                .and_then(|v| v.as_str())
                .map(String::from)
        }
        _ => None,
    };

    let target = target.or_else(|| json.get("main")?.as_str().map(String::from))?;
    Some(normalize(&pkg_dir.join(target.trim_start_matches("./"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_via_stub() {
        let dir = tempdir().unwrap();
        let bin_dir = dir.path().join("node_modules/.bin");
        fs::create_dir_all(&bin_dir).unwrap();
        fs::write(
            bin_dir.join("tool"),
            "#!/usr/bin/env node\nrequire('../tool/cli.js');\n",
        )
        .unwrap();

        let resolved = resolve_bin(dir.path(), "tool").unwrap();
        assert_eq!(resolved, dir.path().join("node_modules/tool/cli.js"));
    }

    #[test]
    fn test_resolve_via_package_bin() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("node_modules/tool");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(
            pkg.join("package.json"),
            r#"{"name":"tool","bin":{"tool":"./run.js"}}"#,
        )
        .unwrap();

        let resolved = resolve_bin(dir.path(), "tool").unwrap();
        assert_eq!(resolved, pkg.join("run.js"));
    }

    #[test]
    fn test_resolve_via_main() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("node_modules/plain");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("package.json"), r#"{"main":"lib/index.js"}"#).unwrap();

        let resolved = resolve_bin(dir.path(), "plain").unwrap();
        assert_eq!(resolved, pkg.join("lib/index.js"));
    }

    #[test]
    fn test_unknown_bin() {
        let dir = tempdir().unwrap();
        assert!(resolve_bin(dir.path(), "ghost").is_none());
    }
}
