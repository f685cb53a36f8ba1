//! Package manager functionality.
//!
//! The npm-lite pipeline: parse specs, fetch packuments, pick versions
//! against semver ranges, download and extract tarballs, lay out
//! `node_modules/`, and write the lockfile.

pub mod error;
pub mod install;
pub mod lockfile;
pub mod registry;
pub mod resolve;
pub mod spec;
pub mod tarball;
pub mod version;

pub use error::{codes as pkg_codes, PkgError};
pub use install::{install_resolved, package_dir, parse_bin_stub, InstallReport};
pub use lockfile::{LockEntry, Lockfile, LOCKFILE_NAME, LOCKFILE_VERSION};
pub use registry::{RegistryClient, DEFAULT_REGISTRY, MAX_TARBALL_SIZE};
pub use resolve::{BinField, PackumentSource, ResolveSpecsResult, ResolvedPackage, Resolver};
pub use spec::PackageSpec;
pub use tarball::extract_tarball;
pub use version::{compare, max_satisfying, parse_version, satisfies, Range};
