//! Errors raised by the package manager pipeline.
//!
//! Every failure carries a stable code so the npm layer can decide
//! whether to fail a command, downgrade to a warning, or treat it as
//! cancellation, without matching on message text.

use std::fmt;
use std::io;

/// Package manager error codes.
pub mod codes {
    pub const PKG_SPEC_INVALID: &str = "PKG_SPEC_INVALID";
    pub const PKG_NOT_FOUND: &str = "PKG_NOT_FOUND";
    pub const PKG_VERSION_NOT_FOUND: &str = "PKG_VERSION_NOT_FOUND";
    pub const PKG_REGISTRY_ERROR: &str = "PKG_REGISTRY_ERROR";
    pub const PKG_DOWNLOAD_FAILED: &str = "PKG_DOWNLOAD_FAILED";
    pub const PKG_EXTRACT_FAILED: &str = "PKG_EXTRACT_FAILED";
    pub const PKG_PACKAGE_JSON_INVALID: &str = "PKG_PACKAGE_JSON_INVALID";
    pub const NODE_MODULES_WRITE_FAILED: &str = "NODE_MODULES_WRITE_FAILED";
    pub const PKG_CANCELED: &str = "PKG_CANCELED";
}

/// Package manager error: a stable code plus a human message.
#[derive(Debug)]
pub struct PkgError {
    code: &'static str,
    message: String,
}

impl PkgError {
    /// Build an error from a code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// The human-readable description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Create a spec invalid error.
    pub fn spec_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_SPEC_INVALID, msg)
    }

    /// Create a package not found error.
    #[must_use]
    pub fn not_found(name: &str) -> Self {
        Self::new(codes::PKG_NOT_FOUND, format!("package not found: {name}"))
    }

    /// Create a version not found error.
    #[must_use]
    pub fn version_not_found(name: &str, range: &str) -> Self {
        Self::new(
            codes::PKG_VERSION_NOT_FOUND,
            format!("no version of {name} satisfies range: {range}"),
        )
    }

    /// Create a registry error.
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_REGISTRY_ERROR, msg)
    }

    /// Create a download failed error.
    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_DOWNLOAD_FAILED, msg)
    }

    /// Create an extraction failed error.
    pub fn extract_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_EXTRACT_FAILED, msg)
    }

    /// Create a package.json invalid error.
    pub fn package_json_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_PACKAGE_JSON_INVALID, msg)
    }

    /// Create a `node_modules` write failed error.
    pub fn node_modules_write_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::NODE_MODULES_WRITE_FAILED, msg)
    }

    /// Create a cancellation error.
    #[must_use]
    pub fn canceled() -> Self {
        Self::new(codes::PKG_CANCELED, "operation canceled")
    }

    /// True when this error represents a cooperative cancellation.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.code == codes::PKG_CANCELED
    }
}

impl fmt::Display for PkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{code}] {message}", code = self.code, message = self.message)
    }
}

impl std::error::Error for PkgError {}

// Bare I/O failures in this pipeline are `node_modules` writes; the
// registry and extraction paths wrap their own errors with context.
impl From<io::Error> for PkgError {
    fn from(e: io::Error) -> Self {
        Self::node_modules_write_failed(e.to_string())
    }
}

impl From<reqwest::Error> for PkgError {
    fn from(e: reqwest::Error) -> Self {
        let what = if e.is_timeout() {
            "registry request timed out"
        } else if e.is_connect() {
            "could not reach registry"
        } else {
            "registry request failed"
        };
        Self::registry(format!("{what}: {e}"))
    }
}

impl From<serde_json::Error> for PkgError {
    fn from(e: serde_json::Error) -> Self {
        Self::registry(format!("malformed registry payload: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_code() {
        let err = PkgError::not_found("left-pad");
        assert_eq!(err.code(), codes::PKG_NOT_FOUND);
        assert!(err.to_string().contains("PKG_NOT_FOUND"));
        assert!(err.to_string().contains("left-pad"));
    }

    #[test]
    fn test_canceled_flag() {
        assert!(PkgError::canceled().is_canceled());
        assert!(!PkgError::registry("boom").is_canceled());
    }
}
