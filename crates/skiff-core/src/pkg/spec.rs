//! Package spec parsing.
//!
//! Accepts the forms clients type at an `npm install` prompt:
//! `react`, `react@18.2.0`, `react@^18.0.0`, `@types/node`,
//! `@types/node@^20`, `left-pad@latest`.

use super::error::PkgError;

/// A parsed package specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Full package name (e.g., "@scope/name" or "name").
    pub name: String,
    /// Version range or tag (None means latest).
    pub range: Option<String>,
}

impl PackageSpec {
    /// Parse a package specification string.
    ///
    /// # Errors
    /// Returns an error if the spec is empty or malformed.
    pub fn parse(input: &str) -> Result<Self, PkgError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(PkgError::spec_invalid("empty package spec"));
        }

        // For scoped names the version delimiter is the '@' after the
        // scope separator, never the leading one.
        let search_from = if input.starts_with('@') {
            match input.find('/') {
                Some(pos) if pos > 1 && pos + 1 < input.len() => pos + 1,
                _ => {
                    return Err(PkgError::spec_invalid(format!(
                        "invalid scoped package: '{input}'"
                    )))
                }
            }
        } else {
            0
        };

        let (name, range) = match input[search_from..].find('@') {
            Some(rel) => {
                let at = search_from + rel;
                let name = &input[..at];
                let range = &input[at + 1..];
                if name.is_empty() || range.is_empty() {
                    return Err(PkgError::spec_invalid(format!(
                        "invalid package spec: '{input}'"
                    )));
                }
                (name, Some(range.to_string()))
            }
            None => (input, None),
        };

        validate_name(name)?;

        Ok(Self {
            name: name.to_string(),
            range,
        })
    }

    /// The scope portion (without `@`), if the name is scoped.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.name
            .strip_prefix('@')
            .and_then(|rest| rest.split('/').next())
    }
}

fn validate_name(name: &str) -> Result<(), PkgError> {
    let bare = name.strip_prefix('@').unwrap_or(name);
    let valid = !bare.is_empty()
        && bare
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if valid {
        Ok(())
    } else {
        Err(PkgError::spec_invalid(format!(
            "invalid package name: '{name}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_name() {
        let spec = PackageSpec::parse("react").unwrap();
        assert_eq!(spec.name, "react");
        assert_eq!(spec.range, None);
        assert_eq!(spec.scope(), None);
    }

    #[test]
    fn test_parse_name_with_range() {
        let spec = PackageSpec::parse("react@^18.0.0").unwrap();
        assert_eq!(spec.name, "react");
        assert_eq!(spec.range.as_deref(), Some("^18.0.0"));
    }

    #[test]
    fn test_parse_scoped() {
        let spec = PackageSpec::parse("@types/node").unwrap();
        assert_eq!(spec.name, "@types/node");
        assert_eq!(spec.scope(), Some("types"));
        assert_eq!(spec.range, None);
    }

    #[test]
    fn test_parse_scoped_with_range() {
        let spec = PackageSpec::parse("@types/node@^20").unwrap();
        assert_eq!(spec.name, "@types/node");
        assert_eq!(spec.range.as_deref(), Some("^20"));
    }

    #[test]
    fn test_parse_tag_range() {
        let spec = PackageSpec::parse("left-pad@latest").unwrap();
        assert_eq!(spec.range.as_deref(), Some("latest"));
    }

    #[test]
    fn test_reject_invalid() {
        assert!(PackageSpec::parse("").is_err());
        assert!(PackageSpec::parse("@").is_err());
        assert!(PackageSpec::parse("@scope").is_err());
        assert!(PackageSpec::parse("react@").is_err());
        assert!(PackageSpec::parse("re act").is_err());
    }
}
