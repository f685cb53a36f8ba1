//! Dependency resolution.
//!
//! Walks the dependency graph breadth-first from a `package.json` (or a
//! list of explicit specs), picking the highest satisfying version for
//! each package. The output is a flat map: each name appears once, the
//! first satisfying pick wins, and a later conflicting demand only
//! records a warning. A `Resolver` owns the packument cache, so its
//! memory is bounded by the lifetime of one resolve call.

use super::error::PkgError;
use super::registry::{self, RegistryClient};
use super::spec::PackageSpec;
use super::version;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Maximum resolution depth, protecting against pathological graphs.
const MAX_DEPTH: usize = 50;

/// The `bin` field of a package, either shorthand or the map form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BinField {
    #[default]
    None,
    /// `"bin": "./cli.js"`; the bin name is the package name.
    Single(String),
    /// `"bin": {"name": "./cli.js", ...}`.
    Map(BTreeMap<String, String>),
}

impl BinField {
    fn from_meta(meta: &Value) -> Self {
        match meta.get("bin") {
            Some(Value::String(path)) => Self::Single(path.clone()),
            Some(Value::Object(map)) => {
                let entries: BTreeMap<String, String> = map
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect();
                if entries.is_empty() {
                    Self::None
                } else {
                    Self::Map(entries)
                }
            }
            _ => Self::None,
        }
    }

    /// Enumerate `(bin name, relative target)` pairs for a package.
    #[must_use]
    pub fn entries(&self, package_name: &str) -> Vec<(String, String)> {
        match self {
            Self::None => Vec::new(),
            Self::Single(path) => {
                let bin_name = package_name.rsplit('/').next().unwrap_or(package_name);
                vec![(bin_name.to_string(), path.clone())]
            }
            Self::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

/// One resolved package, ready for the installer and the lockfile.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    pub tarball: String,
    pub integrity: String,
    pub dependencies: BTreeMap<String, String>,
    pub bin: BinField,
}

/// Result of resolving explicit specs (`npm install <pkg...>`).
#[derive(Debug)]
pub struct ResolveSpecsResult {
    /// Everything that needs installing, transitive deps included.
    pub resolved: BTreeMap<String, ResolvedPackage>,
    /// `name -> caret range` entries for the project's `package.json`.
    pub new_deps: BTreeMap<String, String>,
}

/// Source of packuments. The production impl is [`RegistryClient`];
/// tests substitute an in-memory map.
pub trait PackumentSource {
    fn packument(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Value, PkgError>> + Send;
}

impl PackumentSource for RegistryClient {
    async fn packument(&self, name: &str) -> Result<Value, PkgError> {
        self.fetch_packument(name).await
    }
}

/// Dependency resolver with a per-instance packument cache.
pub struct Resolver<S> {
    source: S,
    cache: HashMap<String, Arc<Value>>,
    /// `name@range` demands currently in flight, consulted before the
    /// output map so a cyclic demand stops recursing.
    resolving: HashSet<String>,
    warnings: Vec<String>,
}

impl<S: PackumentSource> Resolver<S> {
    /// Create a resolver over a packument source.
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: HashMap::new(),
            resolving: HashSet::new(),
            warnings: Vec::new(),
        }
    }

    /// Warnings accumulated during the last resolve.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Resolve the dependency graph of a project `package.json`.
    ///
    /// Dev dependencies of the root are included unless `production`;
    /// transitive resolution follows `dependencies` only. Failures on
    /// individual packages degrade to warnings.
    ///
    /// # Errors
    /// Returns an error only on cancellation.
    pub async fn resolve_project(
        &mut self,
        package_json: &Value,
        production: bool,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, ResolvedPackage>, PkgError> {
        let mut roots: Vec<(String, String)> = Vec::new();
        collect_deps(package_json, "dependencies", &mut roots);
        if !production {
            collect_deps(package_json, "devDependencies", &mut roots);
        }

        let mut out = BTreeMap::new();
        for (name, range) in roots {
            if let Err(e) = self.resolve_dep(&name, &range, 0, &mut out, cancel).await {
                if e.is_canceled() {
                    return Err(e);
                }
                self.warnings.push(format!("{name}@{range}: {e}"));
            }
        }
        Ok(out)
    }

    /// Resolve explicit package specs, e.g. from `npm install react`.
    ///
    /// # Errors
    /// Returns an error when a directly requested package cannot be
    /// resolved, or on cancellation.
    pub async fn resolve_specs(
        &mut self,
        specs: &[PackageSpec],
        cancel: &CancellationToken,
    ) -> Result<ResolveSpecsResult, PkgError> {
        let mut resolved = BTreeMap::new();
        let mut new_deps = BTreeMap::new();

        for spec in specs {
            let range = spec.range.clone().unwrap_or_default();
            self.resolve_dep(&spec.name, &range, 0, &mut resolved, cancel)
                .await?;
            if let Some(pkg) = resolved.get(&spec.name) {
                new_deps.insert(spec.name.clone(), format!("^{}", pkg.version));
            }
        }

        Ok(ResolveSpecsResult { resolved, new_deps })
    }

    /// Resolve one `name@range` demand into `out`, recursing into its
    /// dependencies. Transitive failures are recorded as warnings; only
    /// depth-0 failures and cancellation propagate.
    ///
    /// Two guards run before any work, in this order: the `resolving`
    /// set cuts off a demand that is still in flight further up the
    /// current path (a cycle with the same range string), and the flat
    /// output map absorbs every other repeat, keeping the first
    /// satisfying pick. A cyclic demand whose range string differs
    /// from the in-flight one falls through to the second guard.
    async fn resolve_dep(
        &mut self,
        name: &str,
        range: &str,
        depth: usize,
        out: &mut BTreeMap<String, ResolvedPackage>,
        cancel: &CancellationToken,
    ) -> Result<(), PkgError> {
        if cancel.is_cancelled() {
            return Err(PkgError::canceled());
        }

        // Cycle guard: this exact demand is an ancestor of itself.
        let key = format!("{name}@{range}");
        if self.resolving.contains(&key) {
            return Ok(());
        }

        // Flat layout: the first satisfying pick wins.
        if let Some(existing) = out.get(name) {
            if !version::satisfies(&existing.version, range) {
                self.warnings.push(format!(
                    "{name}: kept {} which does not satisfy later demand '{range}'",
                    existing.version
                ));
            }
            return Ok(());
        }

        if depth > MAX_DEPTH {
            self.warnings
                .push(format!("{name}: dependency graph deeper than {MAX_DEPTH}, skipping"));
            return Ok(());
        }

        self.resolving.insert(key.clone());
        let result = self.resolve_dep_inner(name, range, depth, out, cancel).await;
        self.resolving.remove(&key);
        result
    }

    async fn resolve_dep_inner(
        &mut self,
        name: &str,
        range: &str,
        depth: usize,
        out: &mut BTreeMap<String, ResolvedPackage>,
        cancel: &CancellationToken,
    ) -> Result<(), PkgError> {
        let packument = self.packument_cached(name).await?;

        let version = pick_version(&packument, range)
            .ok_or_else(|| PkgError::version_not_found(name, range))?;
        debug!(name, range, %version, "resolved");

        let meta = registry::get_version_meta(&packument, &version)
            .ok_or_else(|| PkgError::version_not_found(name, &version))?;

        let tarball = meta
            .get("dist")
            .and_then(|d| d.get("tarball"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let integrity = meta
            .get("dist")
            .and_then(|d| d.get("integrity").or_else(|| d.get("shasum")))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let dependencies: BTreeMap<String, String> = meta
            .get("dependencies")
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let resolved = ResolvedPackage {
            name: name.to_string(),
            version,
            tarball,
            integrity,
            dependencies: dependencies.clone(),
            bin: BinField::from_meta(meta),
        };

        // Insert before recursing so the cycle/first-writer checks see it.
        out.insert(name.to_string(), resolved);

        for (dep_name, dep_range) in dependencies {
            if let Err(e) = Box::pin(self.resolve_dep(&dep_name, &dep_range, depth + 1, out, cancel)).await
            {
                if e.is_canceled() {
                    return Err(e);
                }
                self.warnings.push(format!("{dep_name}@{dep_range}: {e}"));
            }
        }

        Ok(())
    }

    async fn packument_cached(&mut self, name: &str) -> Result<Arc<Value>, PkgError> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(cached.clone());
        }
        let packument = Arc::new(self.source.packument(name).await?);
        self.cache.insert(name.to_string(), packument.clone());
        Ok(packument)
    }
}

/// Pick a version for `range`, consulting `dist-tags` first.
///
/// An empty range means the `latest` tag (falling back to the highest
/// published version).
fn pick_version(packument: &Value, range: &str) -> Option<String> {
    let range = range.trim();

    if range.is_empty() || range == "latest" {
        if let Some(latest) = registry::resolve_dist_tag(packument, "latest") {
            return Some(latest.to_string());
        }
        return version::max_satisfying(registry::get_versions(packument), "*")
            .map(|v| v.to_string());
    }

    // Any other tag (e.g. `next`, `beta`) resolves through dist-tags.
    if let Some(tagged) = registry::resolve_dist_tag(packument, range) {
        return Some(tagged.to_string());
    }

    version::max_satisfying(registry::get_versions(packument), range).map(|v| v.to_string())
}

fn collect_deps(package_json: &Value, field: &str, out: &mut Vec<(String, String)>) {
    if let Some(deps) = package_json.get(field).and_then(Value::as_object) {
        for (name, range) in deps {
            if let Some(range) = range.as_str() {
                out.push((name.clone(), range.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// In-memory packument source backed by a map.
    struct FakeRegistry {
        packuments: HashMap<String, Value>,
    }

    impl PackumentSource for FakeRegistry {
        async fn packument(&self, name: &str) -> Result<Value, PkgError> {
            self.packuments
                .get(name)
                .cloned()
                .ok_or_else(|| PkgError::not_found(name))
        }
    }

    fn packument(name: &str, versions: &[(&str, Value)], latest: &str) -> Value {
        let versions_obj: serde_json::Map<String, Value> = versions
            .iter()
            .map(|(v, deps)| {
                (
                    (*v).to_string(),
                    json!({
                        "version": v,
                        "dist": {
                            "tarball": format!("https://example.com/{name}/-/{name}-{v}.tgz"),
                            "integrity": format!("sha512-{name}-{v}")
                        },
                        "dependencies": deps,
                    }),
                )
            })
            .collect();

        json!({
            "name": name,
            "dist-tags": { "latest": latest },
            "versions": versions_obj
        })
    }

    fn registry_of(packuments: Vec<Value>) -> FakeRegistry {
        FakeRegistry {
            packuments: packuments
                .into_iter()
                .map(|p| (p["name"].as_str().unwrap().to_string(), p))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_resolve_transitive_graph() {
        let registry = registry_of(vec![
            packument(
                "left-pad",
                &[
                    ("0.0.1", json!({})),
                    ("1.0.0", json!({})),
                    ("1.3.0", json!({"right-pad": "^1.0.0"})),
                ],
                "1.3.0",
            ),
            packument(
                "right-pad",
                &[("1.0.0", json!({})), ("1.0.5", json!({}))],
                "1.0.5",
            ),
        ]);

        let mut resolver = Resolver::new(registry);
        let project = json!({"dependencies": {"left-pad": "^1.0.0"}});
        let resolved = resolver
            .resolve_project(&project, false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolved["left-pad"].version, "1.3.0");
        assert_eq!(resolved["right-pad"].version, "1.0.5");
        assert!(resolver.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_first_writer_wins_with_warning() {
        let registry = registry_of(vec![
            packument("a", &[("1.0.0", json!({"shared": "^1.0.0"}))], "1.0.0"),
            packument("b", &[("1.0.0", json!({"shared": "^2.0.0"}))], "1.0.0"),
            packument(
                "shared",
                &[("1.5.0", json!({})), ("2.5.0", json!({}))],
                "2.5.0",
            ),
        ]);

        let mut resolver = Resolver::new(registry);
        let project = json!({"dependencies": {"a": "*", "b": "*"}});
        let resolved = resolver
            .resolve_project(&project, false, &CancellationToken::new())
            .await
            .unwrap();

        // `a` resolves first (BTreeMap order of the root map is not
        // what drives this: roots are walked in collection order).
        assert_eq!(resolved["shared"].version, "1.5.0");
        assert!(resolver
            .warnings()
            .iter()
            .any(|w| w.contains("shared") && w.contains("^2.0.0")));
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let registry = registry_of(vec![
            packument("ping", &[("1.0.0", json!({"pong": "^1.0.0"}))], "1.0.0"),
            packument("pong", &[("1.0.0", json!({"ping": "^1.0.0"}))], "1.0.0"),
        ]);

        let mut resolver = Resolver::new(registry);
        let project = json!({"dependencies": {"ping": "^1.0.0"}});
        let resolved = resolver
            .resolve_project(&project, false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolved.len(), 2);
    }

    #[tokio::test]
    async fn test_self_dependency_terminates() {
        let registry = registry_of(vec![packument(
            "loop",
            &[("1.0.0", json!({"loop": "^1.0.0"}))],
            "1.0.0",
        )]);

        let mut resolver = Resolver::new(registry);
        let project = json!({"dependencies": {"loop": "^1.0.0"}});
        let resolved = resolver
            .resolve_project(&project, false, &CancellationToken::new())
            .await
            .unwrap();

        // The recursive demand `loop@^1.0.0` is its own ancestor; the
        // in-flight set stops it before the output map is consulted.
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved["loop"].version, "1.0.0");
        assert!(resolver.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_missing_transitive_warns() {
        let registry = registry_of(vec![packument(
            "a",
            &[("1.0.0", json!({"ghost": "^1.0.0"}))],
            "1.0.0",
        )]);

        let mut resolver = Resolver::new(registry);
        let project = json!({"dependencies": {"a": "^1.0.0"}});
        let resolved = resolver
            .resolve_project(&project, false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolved.len(), 1);
        assert!(resolver.warnings().iter().any(|w| w.contains("ghost")));
    }

    #[tokio::test]
    async fn test_prereleases_not_picked() {
        let registry = registry_of(vec![packument(
            "lib",
            &[
                ("1.0.0", json!({})),
                ("1.2.3", json!({})),
                ("2.0.0-rc.1", json!({})),
            ],
            "1.2.3",
        )]);

        let mut resolver = Resolver::new(registry);
        let project = json!({"dependencies": {"lib": ">=1.0.0"}});
        let resolved = resolver
            .resolve_project(&project, false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolved["lib"].version, "1.2.3");
    }

    #[tokio::test]
    async fn test_dist_tag_resolution() {
        let mut p = packument("lib", &[("1.0.0", json!({})), ("2.0.0-rc.1", json!({}))], "1.0.0");
        p["dist-tags"]["next"] = json!("2.0.0-rc.1");
        let registry = registry_of(vec![p]);

        let mut resolver = Resolver::new(registry);
        let specs = vec![PackageSpec::parse("lib@next").unwrap()];
        let result = resolver
            .resolve_specs(&specs, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.resolved["lib"].version, "2.0.0-rc.1");
        assert_eq!(result.new_deps["lib"], "^2.0.0-rc.1");
    }

    #[tokio::test]
    async fn test_resolve_specs_unknown_package_fails() {
        let registry = registry_of(vec![]);
        let mut resolver = Resolver::new(registry);
        let specs = vec![PackageSpec::parse("ghost").unwrap()];
        let result = resolver.resolve_specs(&specs, &CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let registry = registry_of(vec![packument("a", &[("1.0.0", json!({}))], "1.0.0")]);
        let mut resolver = Resolver::new(registry);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let project = json!({"dependencies": {"a": "*"}});
        let result = resolver.resolve_project(&project, false, &cancel).await;
        assert!(result.unwrap_err().is_canceled());
    }

    #[tokio::test]
    async fn test_dev_deps_skipped_in_production() {
        let registry = registry_of(vec![
            packument("runtime-dep", &[("1.0.0", json!({}))], "1.0.0"),
            packument("dev-dep", &[("1.0.0", json!({}))], "1.0.0"),
        ]);

        let mut resolver = Resolver::new(registry);
        let project = json!({
            "dependencies": {"runtime-dep": "*"},
            "devDependencies": {"dev-dep": "*"}
        });
        let resolved = resolver
            .resolve_project(&project, true, &CancellationToken::new())
            .await
            .unwrap();

        assert!(resolved.contains_key("runtime-dep"));
        assert!(!resolved.contains_key("dev-dep"));
    }

    #[test]
    fn test_bin_field_entries() {
        let single = BinField::Single("./cli.js".to_string());
        assert_eq!(
            single.entries("@scope/tool"),
            vec![("tool".to_string(), "./cli.js".to_string())]
        );

        let mut map = BTreeMap::new();
        map.insert("a".to_string(), "bin/a.js".to_string());
        let mapped = BinField::Map(map);
        assert_eq!(
            mapped.entries("pkg"),
            vec![("a".to_string(), "bin/a.js".to_string())]
        );

        assert!(BinField::None.entries("pkg").is_empty());
    }
}
