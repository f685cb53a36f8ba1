//! npm registry client.

use super::error::PkgError;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Metadata (packument) request timeout.
const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Tarball download timeout.
const TARBALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Maximum tarball size (200 MB).
pub const MAX_TARBALL_SIZE: u64 = 200 * 1024 * 1024;

/// Registry client for packument fetches and tarball downloads.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: Client,
}

impl RegistryClient {
    /// Create a new registry client with the given base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot
    /// be created.
    pub fn new(base_url: &str) -> Result<Self, PkgError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PkgError::registry(format!("invalid registry URL '{base_url}': {e}")))?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(concat!("skiff/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PkgError::registry(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch the packument (full version listing) for a package.
    ///
    /// # Errors
    /// Returns an error if the request fails, times out, or the package
    /// does not exist.
    pub async fn fetch_packument(&self, name: &str) -> Result<serde_json::Value, PkgError> {
        let url = self
            .base_url
            .join(&encode_name(name))
            .map_err(|e| PkgError::registry(format!("failed to build URL for '{name}': {e}")))?;

        let response = self
            .http
            .get(url.as_str())
            .timeout(METADATA_TIMEOUT)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PkgError::not_found(name));
        }
        if !response.status().is_success() {
            return Err(PkgError::registry(format!(
                "HTTP {} for '{name}'",
                response.status().as_u16()
            )));
        }

        let json: serde_json::Value = response.json().await?;
        Ok(json)
    }

    /// Download a tarball.
    ///
    /// # Errors
    /// Returns an error if the download fails or exceeds the size cap.
    pub async fn download_tarball(&self, url: &str) -> Result<Bytes, PkgError> {
        let response = self
            .http
            .get(url)
            .timeout(TARBALL_TIMEOUT)
            .send()
            .await
            .map_err(|e| PkgError::download_failed(format!("failed to download '{url}': {e}")))?;

        if !response.status().is_success() {
            return Err(PkgError::download_failed(format!(
                "HTTP {} for '{url}'",
                response.status().as_u16()
            )));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_TARBALL_SIZE {
                return Err(PkgError::download_failed(format!(
                    "tarball too large: {len} bytes"
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PkgError::download_failed(format!("failed to read body: {e}")))?;

        if bytes.len() as u64 > MAX_TARBALL_SIZE {
            return Err(PkgError::download_failed(format!(
                "tarball too large: {} bytes",
                bytes.len()
            )));
        }

        Ok(bytes)
    }
}

/// URL-encode a package name, preserving a scope's leading `@`.
fn encode_name(name: &str) -> String {
    if name.starts_with('@') {
        name.replace('/', "%2F")
    } else {
        name.to_string()
    }
}

/// Extract the version a `dist-tags` tag points at.
#[must_use]
pub fn resolve_dist_tag<'a>(packument: &'a serde_json::Value, tag: &str) -> Option<&'a str> {
    packument.get("dist-tags")?.get(tag)?.as_str()
}

/// Extract all published version strings from a packument.
#[must_use]
pub fn get_versions(packument: &serde_json::Value) -> Vec<&str> {
    packument
        .get("versions")
        .and_then(|v| v.as_object())
        .map(|obj| obj.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

/// Extract a specific version's metadata object.
#[must_use]
pub fn get_version_meta<'a>(
    packument: &'a serde_json::Value,
    version: &str,
) -> Option<&'a serde_json::Value> {
    packument.get("versions")?.get(version)
}
