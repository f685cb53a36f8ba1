//! Backend configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "SKIFF_DATA_DIR";

/// Environment variable overriding the npm registry URL.
pub const REGISTRY_ENV: &str = "SKIFF_NPM_REGISTRY";

/// Runtime configuration for the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root data directory; project trees live under `projects/`.
    pub datadir: PathBuf,

    /// npm registry base URL.
    pub registry_url: String,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            datadir: default_datadir(),
            registry_url: crate::pkg::registry::DEFAULT_REGISTRY.to_string(),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Build a config from the environment, with defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                config.datadir = PathBuf::from(dir);
            }
        }
        if let Ok(url) = std::env::var(REGISTRY_ENV) {
            if !url.is_empty() {
                config.registry_url = url;
            }
        }
        config
    }

    /// Set the data directory.
    #[must_use]
    pub fn with_datadir(mut self, datadir: PathBuf) -> Self {
        self.datadir = datadir;
        self
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Directory that holds user projects.
    #[must_use]
    pub fn projects_dir(&self) -> PathBuf {
        self.datadir.join("projects")
    }
}

fn default_datadir() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".skiff")
    } else {
        std::env::temp_dir().join("skiff")
    }
}
