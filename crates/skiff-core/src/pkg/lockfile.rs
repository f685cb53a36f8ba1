//! Lockfile reading and writing.
//!
//! The lockfile records the flat resolve result so repeated installs
//! are deterministic: `BTreeMap` keys give stable ordering, and two
//! installs over the same inputs produce byte-identical files.

use super::resolve::ResolvedPackage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;

/// Lockfile file name.
pub const LOCKFILE_NAME: &str = "package-lock.json";

/// Lockfile schema version.
pub const LOCKFILE_VERSION: u32 = 1;

/// The on-disk lockfile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lockfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "lockfileVersion")]
    pub lockfile_version: u32,

    #[serde(default)]
    pub dependencies: BTreeMap<String, LockEntry>,
}

/// One locked package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockEntry {
    pub version: String,

    pub resolved: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub integrity: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requires: BTreeMap<String, String>,
}

impl Lockfile {
    /// Build a lockfile from a resolve result.
    #[must_use]
    pub fn from_resolved(
        project_name: Option<String>,
        resolved: &BTreeMap<String, ResolvedPackage>,
    ) -> Self {
        let dependencies = resolved
            .iter()
            .map(|(name, pkg)| {
                (
                    name.clone(),
                    LockEntry {
                        version: pkg.version.clone(),
                        resolved: pkg.tarball.clone(),
                        integrity: pkg.integrity.clone(),
                        requires: pkg.dependencies.clone(),
                    },
                )
            })
            .collect();

        Self {
            name: project_name,
            lockfile_version: LOCKFILE_VERSION,
            dependencies,
        }
    }

    /// Write the lockfile under `project_dir`.
    ///
    /// # Errors
    /// Returns an error when serialization or the write fails.
    pub fn write_to(&self, project_dir: &Path) -> io::Result<()> {
        let mut body = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        body.push('\n');
        std::fs::write(project_dir.join(LOCKFILE_NAME), body)
    }

    /// Read a lockfile from `project_dir`, if present and valid.
    #[must_use]
    pub fn read_from(project_dir: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(project_dir.join(LOCKFILE_NAME)).ok()?;
        serde_json::from_str(&content).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::resolve::BinField;
    use tempfile::tempdir;

    fn resolved_fixture() -> BTreeMap<String, ResolvedPackage> {
        let mut map = BTreeMap::new();
        let mut deps = BTreeMap::new();
        deps.insert("right-pad".to_string(), "^1.0.0".to_string());
        map.insert(
            "left-pad".to_string(),
            ResolvedPackage {
                name: "left-pad".to_string(),
                version: "1.3.0".to_string(),
                tarball: "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz".to_string(),
                integrity: "sha512-abc".to_string(),
                dependencies: deps,
                bin: BinField::None,
            },
        );
        map.insert(
            "right-pad".to_string(),
            ResolvedPackage {
                name: "right-pad".to_string(),
                version: "1.0.5".to_string(),
                tarball: "https://registry.npmjs.org/right-pad/-/right-pad-1.0.5.tgz".to_string(),
                integrity: String::new(),
                dependencies: BTreeMap::new(),
                bin: BinField::None,
            },
        );
        map
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let lockfile = Lockfile::from_resolved(Some("app".to_string()), &resolved_fixture());
        lockfile.write_to(dir.path()).unwrap();

        let read = Lockfile::read_from(dir.path()).unwrap();
        assert_eq!(read, lockfile);
        assert_eq!(read.lockfile_version, LOCKFILE_VERSION);
        assert_eq!(read.dependencies["left-pad"].version, "1.3.0");
        assert_eq!(
            read.dependencies["left-pad"].requires["right-pad"],
            "^1.0.0"
        );
    }

    #[test]
    fn test_deterministic_bytes() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        let lockfile = Lockfile::from_resolved(Some("app".to_string()), &resolved_fixture());
        lockfile.write_to(dir_a.path()).unwrap();
        lockfile.write_to(dir_b.path()).unwrap();

        let a = std::fs::read(dir_a.path().join(LOCKFILE_NAME)).unwrap();
        let b = std::fs::read(dir_b.path().join(LOCKFILE_NAME)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_integrity_omitted() {
        let lockfile = Lockfile::from_resolved(None, &resolved_fixture());
        let body = serde_json::to_string(&lockfile).unwrap();
        // right-pad has no integrity; the field is dropped entirely.
        assert!(!body.contains(r#""integrity":"""#));
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = tempdir().unwrap();
        assert!(Lockfile::read_from(dir.path()).is_none());
    }
}
