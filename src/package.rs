// src/package.rs

//! Package manifests and installed-package records
//!
//! A `Package` is the declared form read from `package.json` or a registry
//! descriptor. It becomes an `InstalledPackage` once its files have been
//! copied into the versioned install directory.

use crate::error::{Error, Result};
use crate::version::{Constraint, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Manifest file name inside package archives and project directories
pub const MANIFEST_FILE: &str = "package.json";

/// Declared package metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// Dependency name -> constraint expression (e.g. "openssl": ">=1.1.0")
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,

    /// Source path inside the archive -> destination path under the install dir
    #[serde(default)]
    pub files: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_install: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_install: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_remove: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_remove: Vec<String>,
}

impl Package {
    /// Create a new package with no dependencies or files
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Builder-style helper for adding a dependency edge
    pub fn with_dependency(mut self, name: impl Into<String>, constraint: impl Into<String>) -> Self {
        self.dependencies.insert(name.into(), constraint.into());
        self
    }

    /// Builder-style helper for adding a file mapping
    pub fn with_file(mut self, src: impl Into<String>, dest: impl Into<String>) -> Self {
        self.files.insert(src.into(), dest.into());
        self
    }

    /// Resolution key: `name@version`
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Parsed version, if well formed
    pub fn parsed_version(&self) -> Result<Version> {
        Version::parse(&self.version)
    }

    /// Read a manifest from disk
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            Error::ManifestError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&data).map_err(|e| {
            Error::ManifestError(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Write this manifest as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Lifecycle scripts as `(script_type, command)` pairs, in declaration order
    pub fn scripts(&self) -> Vec<(&'static str, &str)> {
        let mut scripts = Vec::new();
        for (kind, commands) in [
            ("pre_install", &self.pre_install),
            ("post_install", &self.post_install),
            ("pre_remove", &self.pre_remove),
            ("post_remove", &self.post_remove),
        ] {
            scripts.extend(commands.iter().map(|cmd| (kind, cmd.as_str())));
        }
        scripts
    }

    /// Check the fields a registry requires before accepting a publish
    pub fn validate_for_publish(&self) -> Result<()> {
        if self.name.is_empty() || self.version.is_empty() || self.description.is_empty() {
            return Err(Error::ManifestError(
                "package.json must have name, version, and description".to_string(),
            ));
        }

        self.parsed_version()?;

        for (dep, constraint) in &self.dependencies {
            Constraint::parse(constraint).map_err(|e| {
                Error::ManifestError(format!("dependency '{}': {}", dep, e))
            })?;
        }

        if self.files.is_empty() {
            return Err(Error::ManifestError(
                "package.json must have at least one file".to_string(),
            ));
        }

        Ok(())
    }
}

/// A package whose files are on disk and recorded in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub package: Package,
    /// Versioned install directory (`<root>/packages/<name>/<version>`)
    pub install_path: PathBuf,
    /// Absolute paths written during install, in install order
    pub installed_files: Vec<PathBuf>,
    pub installed_at: DateTime<Utc>,
}

impl InstalledPackage {
    pub fn new(package: Package, install_path: PathBuf, installed_files: Vec<PathBuf>) -> Self {
        Self {
            package,
            install_path,
            installed_files,
            installed_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.package.name
    }

    pub fn version(&self) -> &str {
        &self.package.version
    }
}
