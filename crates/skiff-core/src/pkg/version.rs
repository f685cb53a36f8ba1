//! Version and range handling on top of the semver crate.
//!
//! npm range syntax is wider than what `semver::VersionReq` accepts, so
//! ranges pass through a conversion layer first:
//! - `||` disjunctions are split and evaluated as any-of
//! - hyphen ranges `A - B` become `>=A, <=B` (exclusive next bound when
//!   `B` is partial)
//! - x-ranges (`1.x`, `1.2.*`, `*`) and bare partials (`1`, `1.2`)
//!   become min-bound plus exclusive next
//! - space-separated comparators (`>= 2.1.2 < 3.0.0`) become the
//!   comma-separated AND form
//!
//! A range that still fails to parse degrades to `>=0.0.0` rather than
//! erroring, so non-canonical constraints never block an install. Tags
//! like `latest` are resolved against `dist-tags` before they reach
//! this module; one that slips through matches everything.

use semver::{Version, VersionReq};
use std::cmp::Ordering;

/// Parse a version string, accepting an optional leading `v` or `=`.
///
/// Returns `None` for anything `semver` cannot parse.
#[must_use]
pub fn parse_version(input: &str) -> Option<Version> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('='))
        .unwrap_or(trimmed);
    Version::parse(trimmed.trim()).ok()
}

/// Compare two versions by semver precedence.
#[must_use]
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp(b)
}

/// A parsed range: a disjunction of `VersionReq` conjunctions.
#[derive(Debug, Clone)]
pub struct Range {
    reqs: Vec<VersionReq>,
}

impl Range {
    /// Parse an npm-flavored range string. Never fails: an unparseable
    /// range degrades to the permissive `>=0.0.0`.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let mut reqs: Vec<VersionReq> = Vec::new();

        for alt in input.split("||") {
            let alt = alt.trim();
            if let Some(req) = parse_conjunction(alt) {
                reqs.push(req);
            }
        }

        if reqs.is_empty() {
            reqs.push(VersionReq::parse(">=0.0.0").expect("permissive range parses"));
        }

        Self { reqs }
    }

    /// True when `version` passes any disjunct.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.reqs.iter().any(|req| req.matches(version))
    }

    /// True when any comparator in the range names a prerelease.
    #[must_use]
    pub fn mentions_prerelease(&self) -> bool {
        self.reqs
            .iter()
            .any(|req| req.comparators.iter().any(|c| !c.pre.is_empty()))
    }
}

/// Test a version string against a range string.
#[must_use]
pub fn satisfies(version: &str, range: &str) -> bool {
    parse_version(version).is_some_and(|v| Range::parse(range).matches(&v))
}

/// Pick the highest version admitted by `range`.
///
/// Prerelease versions are excluded unless the range itself mentions a
/// prerelease. Unparseable version strings are skipped.
#[must_use]
pub fn max_satisfying<'a, I>(versions: I, range: &str) -> Option<Version>
where
    I: IntoIterator<Item = &'a str>,
{
    let parsed = Range::parse(range);
    let allow_prerelease = parsed.mentions_prerelease();

    versions
        .into_iter()
        .filter_map(parse_version)
        .filter(|v| v.pre.is_empty() || allow_prerelease)
        .filter(|v| parsed.matches(v))
        .max()
}

/// Parse a single `&&`-conjunction (no `||` inside).
fn parse_conjunction(input: &str) -> Option<VersionReq> {
    let input = input.trim();

    // Empty and wildcard forms admit everything.
    if input.is_empty() || matches!(input, "*" | "x" | "X") {
        return VersionReq::parse(">=0.0.0").ok();
    }

    // Hyphen ranges: "1.0.0 - 2.0.0".
    if let Some(converted) = convert_hyphen_range(input) {
        return VersionReq::parse(&converted).ok();
    }

    // X-ranges and bare partials: "1.x", "1.2.*", "1", "1.2".
    if let Some(converted) = convert_partial(input) {
        return VersionReq::parse(&converted).ok();
    }

    // Space-separated comparators mean AND in npm.
    let converted = join_comparators(input);
    VersionReq::parse(&converted).ok()
}

/// Convert `A - B` to `>=A, <=B` (or an exclusive bound for partial B).
fn convert_hyphen_range(input: &str) -> Option<String> {
    let (start, end) = input.split_once(" - ")?;
    let start = start.trim();
    let end = end.trim();
    if start.is_empty() || end.is_empty() {
        return None;
    }

    let lower = fill_partial(start)?;
    let upper = match split_numeric_parts(end) {
        Some(parts) => match parts.as_slice() {
            [major] => format!("<{}.0.0", major + 1),
            [major, minor] => format!("<{major}.{}.0", minor + 1),
            _ => format!("<={end}"),
        },
        // Full version with prerelease/build metadata.
        None => format!("<={end}"),
    };

    Some(format!(">={lower}, {upper}"))
}

/// Convert an x-range or bare partial to min-bound + exclusive next.
///
/// Returns `None` when the input is not a partial (e.g. a full version
/// or an operator form, which `VersionReq` handles directly).
fn convert_partial(input: &str) -> Option<String> {
    let parts: Vec<&str> = input.split('.').collect();
    let is_wild = |s: &str| matches!(s, "x" | "X" | "*");
    let num = |s: &str| s.parse::<u64>().ok();

    match parts.as_slice() {
        [major] => {
            let m = num(major)?;
            Some(format!(">={m}.0.0, <{}.0.0", m + 1))
        }
        [major, minor] if is_wild(minor) => {
            let m = num(major)?;
            Some(format!(">={m}.0.0, <{}.0.0", m + 1))
        }
        [major, minor] => {
            let m = num(major)?;
            let n = num(minor)?;
            Some(format!(">={m}.{n}.0, <{m}.{}.0", n + 1))
        }
        [major, minor, patch] if is_wild(minor) || is_wild(patch) => {
            let m = num(major)?;
            if is_wild(minor) {
                Some(format!(">={m}.0.0, <{}.0.0", m + 1))
            } else {
                let n = num(minor)?;
                Some(format!(">={m}.{n}.0, <{m}.{}.0", n + 1))
            }
        }
        _ => None,
    }
}

/// Split a partial like "2" or "1.2" into numeric components.
fn split_numeric_parts(input: &str) -> Option<Vec<u64>> {
    let parts: Vec<&str> = input.split('.').collect();
    if parts.len() >= 3 {
        return None;
    }
    parts.iter().map(|p| p.parse::<u64>().ok()).collect()
}

/// Zero-fill a partial lower bound: "1.2" -> "1.2.0".
fn fill_partial(input: &str) -> Option<String> {
    if input.split('.').count() >= 3 {
        return Some(input.to_string());
    }
    let parts = split_numeric_parts(input)?;
    match parts.as_slice() {
        [major] => Some(format!("{major}.0.0")),
        [major, minor] => Some(format!("{major}.{minor}.0")),
        _ => None,
    }
}

/// Join whitespace-separated comparators with commas, reattaching
/// operators that npm allows to float free of their version
/// (`>= 2.1.2 < 3.0.0` -> `>=2.1.2, <3.0.0`).
fn join_comparators(input: &str) -> String {
    let mut pieces: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;

    for token in input.split_whitespace() {
        let is_bare_op = token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^'));
        if is_bare_op {
            pending_op = Some(match pending_op.take() {
                Some(prev) => prev + token,
                None => token.to_string(),
            });
            continue;
        }
        match pending_op.take() {
            Some(op) => pieces.push(op + token),
            None => pieces.push(token.to_string()),
        }
    }
    if let Some(op) = pending_op {
        pieces.push(op);
    }

    if pieces.is_empty() {
        input.to_string()
    } else {
        pieces.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_prefixes() {
        assert_eq!(parse_version("1.2.3").unwrap().to_string(), "1.2.3");
        assert_eq!(parse_version("v1.2.3").unwrap().to_string(), "1.2.3");
        assert_eq!(parse_version("=1.2.3").unwrap().to_string(), "1.2.3");
        assert!(parse_version("not-a-version").is_none());
        assert!(parse_version("1.2").is_none());
    }

    #[test]
    fn test_compare_prerelease_precedence() {
        let stable = parse_version("2.0.0").unwrap();
        let rc = parse_version("2.0.0-rc.1").unwrap();
        let alpha = parse_version("2.0.0-alpha").unwrap();
        assert_eq!(compare(&rc, &stable), Ordering::Less);
        assert_eq!(compare(&alpha, &rc), Ordering::Less);
        // Numeric identifiers sort below alphanumeric ones.
        let num = parse_version("1.0.0-1").unwrap();
        let alnum = parse_version("1.0.0-alpha").unwrap();
        assert_eq!(compare(&num, &alnum), Ordering::Less);
    }

    #[test]
    fn test_satisfies_basic_ranges() {
        assert!(satisfies("1.2.3", "^1.0.0"));
        assert!(satisfies("1.2.3", "~1.2.0"));
        assert!(!satisfies("2.0.0", "^1.0.0"));
        assert!(!satisfies("1.3.0", "~1.2.0"));
    }

    #[test]
    fn test_satisfies_permissive_forms() {
        for range in ["", "*", "latest", "x"] {
            assert!(satisfies("0.0.1", range), "range {range:?}");
            assert!(satisfies("99.0.0", range), "range {range:?}");
        }
    }

    #[test]
    fn test_satisfies_prerelease_excluded() {
        assert!(!satisfies("2.0.0-rc.1", "^2.0.0"));
        assert!(satisfies("2.0.0-rc.2", "^2.0.0-rc.1"));
    }

    #[test]
    fn test_unparseable_range_degrades() {
        assert!(satisfies("1.0.0", "not-a-range!!!"));
        assert!(satisfies("0.0.1", "banana"));
    }

    #[test]
    fn test_or_range() {
        assert!(satisfies("3.0.0", "^1.0.0 || ^3.0.0"));
        assert!(!satisfies("2.0.0", "^1.0.0 || ^3.0.0"));
        assert!(satisfies("14.5.0", "^14.0.0||^15.0.0"));
    }

    #[test]
    fn test_hyphen_range() {
        assert!(satisfies("1.5.0", "1.0.0 - 2.0.0"));
        assert!(satisfies("2.0.0", "1.0.0 - 2.0.0"));
        assert!(!satisfies("2.0.1", "1.0.0 - 2.0.0"));
        // Partial upper bound relaxes to exclusive next.
        assert!(satisfies("2.9.9", "1.0.0 - 2"));
        assert!(!satisfies("3.0.0", "1.0.0 - 2"));
        assert!(satisfies("2.3.9", "1.0.0 - 2.3"));
        assert!(!satisfies("2.4.0", "1.0.0 - 2.3"));
    }

    #[test]
    fn test_x_ranges_and_partials() {
        assert!(satisfies("1.9.0", "1.x"));
        assert!(!satisfies("2.0.0", "1.x"));
        assert!(satisfies("1.2.9", "1.2.x"));
        assert!(!satisfies("1.3.0", "1.2.*"));
        assert!(satisfies("1.9.0", "1"));
        assert!(satisfies("1.2.9", "1.2"));
        assert!(!satisfies("1.3.0", "1.2"));
    }

    #[test]
    fn test_space_separated_comparators() {
        assert!(satisfies("2.5.0", ">= 2.1.2 < 3.0.0"));
        assert!(satisfies("2.1.2", ">=2.1.2 <3.0.0"));
        assert!(!satisfies("3.0.0", ">= 2.1.2 < 3.0.0"));
    }

    #[test]
    fn test_max_satisfying_scenario() {
        let picked =
            max_satisfying(["1.0.0", "1.2.3", "2.0.0-rc.1", "2.0.0"], "^1.0.0").unwrap();
        assert_eq!(picked.to_string(), "1.2.3");
    }

    #[test]
    fn test_max_satisfying_excludes_prereleases() {
        let picked = max_satisfying(["1.0.0", "1.5.0", "2.0.0-rc.1"], ">=1.0.0").unwrap();
        assert_eq!(picked.to_string(), "1.5.0");
    }

    #[test]
    fn test_max_satisfying_allows_mentioned_prerelease() {
        let picked =
            max_satisfying(["2.0.0-rc.1", "2.0.0-rc.2"], "^2.0.0-rc.1").unwrap();
        assert_eq!(picked.to_string(), "2.0.0-rc.2");
    }

    #[test]
    fn test_max_satisfying_ordering_law() {
        // v1 < v2 < v3 and range ">=v1" picks v3.
        let picked = max_satisfying(["1.0.0", "1.1.0", "1.2.0"], ">=1.0.0").unwrap();
        assert_eq!(picked.to_string(), "1.2.0");
    }

    #[test]
    fn test_max_satisfying_none() {
        assert!(max_satisfying(["1.0.0", "2.0.0"], "^3.0.0").is_none());
        assert!(max_satisfying(std::iter::empty(), "*").is_none());
    }

    #[test]
    fn test_skips_garbage_versions() {
        let picked = max_satisfying(["garbage", "1.0.0"], "*").unwrap();
        assert_eq!(picked.to_string(), "1.0.0");
    }
}
