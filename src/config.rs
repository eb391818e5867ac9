// src/config.rs

//! Runtime configuration
//!
//! `Layout` describes where things live under the install root:
//!
//! ```text
//! <root>/packages/<name>/<version>/...   versioned install trees
//! <root>/bin/                            symlinks to installed executables
//! <root>/packages.db                     package store
//! ```
//!
//! `Config` carries the layout together with the registry settings and the
//! "assume yes" answer for confirmation prompts. It is built once from the
//! command line and environment and passed down explicitly.

use std::path::{Path, PathBuf};

/// Default install root
pub const DEFAULT_ROOT: &str = "/opt/cupertino";

/// Default registry base URL
pub const DEFAULT_REGISTRY: &str = "http://localhost:8080";

/// Environment variable overriding the install root
pub const ROOT_ENV: &str = "CUPERTINO_ROOT";

/// Environment variable overriding the registry base URL
pub const REGISTRY_ENV: &str = "CUPERTINO_REGISTRY";

/// Environment variable holding the publish API key
pub const API_KEY_ENV: &str = "CUPERTINO_API_KEY";

/// Filesystem layout under an install root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    /// Versioned install directory for one release
    pub fn package_dir(&self, name: &str, version: &str) -> PathBuf {
        self.packages_dir().join(name).join(version)
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join("packages.db")
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

/// Settings for one command invocation
#[derive(Debug, Clone)]
pub struct Config {
    pub layout: Layout,
    pub registry_url: String,
    pub api_key: Option<String>,
    /// Answer yes to every confirmation prompt
    pub assume_yes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            registry_url: DEFAULT_REGISTRY.to_string(),
            api_key: None,
            assume_yes: false,
        }
    }
}
