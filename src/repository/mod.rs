// src/repository/mod.rs

//! Registry access and package downloading
//!
//! This module provides:
//! - The `Registry` capability the installer and resolver depend on
//! - A blocking HTTP client for the registry API with transport retries
//! - Artifact checksum verification
//! - Package search and publishing

use crate::error::{Error, Result};
use crate::package::Package;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response, multipart};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts for requests that fail before a response arrives
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds, multiplied by the attempt number
const RETRY_DELAY_MS: u64 = 1000;

/// Results returned by a search request
pub const SEARCH_LIMIT: usize = 20;

/// Package summary from `GET /api/packages/{name}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageInfo {
    pub name: String,
    pub description: String,
    pub homepage: String,
    pub license: String,
    pub versions: Vec<String>,
    pub latest: String,
    pub downloads: u64,
}

/// Full release descriptor from `GET /api/packages/{name}/{version}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryPackage {
    pub name: String,
    pub version: String,
    pub description: String,
    pub homepage: String,
    pub license: String,
    pub dependencies: BTreeMap<String, String>,
    pub files: BTreeMap<String, String>,
    /// Hex-encoded SHA-256 of the archive
    pub checksum: String,
    pub size: u64,
    pub download_url: String,
}

impl RegistryPackage {
    /// Manifest view of this release
    pub fn to_package(&self) -> Package {
        Package {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            homepage: non_empty(&self.homepage),
            license: non_empty(&self.license),
            dependencies: self.dependencies.clone(),
            files: self.files.clone(),
            ..Default::default()
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Read access to a package registry
pub trait Registry {
    /// Summary and version list for a package
    fn package_info(&self, name: &str) -> Result<PackageInfo>;

    /// Descriptor for one release
    fn package_version(&self, name: &str, version: &str) -> Result<RegistryPackage>;

    /// Download a release archive into `dest_dir` and verify its checksum
    fn download(&self, pkg: &RegistryPackage, dest_dir: &Path) -> Result<PathBuf>;

    /// Descriptor for the release the registry marks as latest
    fn latest(&self, name: &str) -> Result<RegistryPackage> {
        let info = self.package_info(name)?;
        if info.latest.is_empty() {
            return Err(Error::NotFoundError(format!(
                "Package '{}' has no published versions",
                name
            )));
        }
        self.package_version(name, &info.latest)
    }
}

/// HTTP client for the registry API
pub struct RegistryClient {
    client: Client,
    base_url: String,
    max_retries: u32,
}

impl RegistryClient {
    /// Create a client for the registry at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: MAX_RETRIES,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request, retrying only when no response was received
    fn send(&self, build: impl Fn() -> RequestBuilder, what: &str) -> Result<Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match build().send() {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::RegistryError(format!(
                            "Failed to {} after {} attempts: {}",
                            what, attempt, e
                        )));
                    }
                    warn!("Attempt {} to {} failed: {}, retrying...", attempt, what, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    /// Search packages by name or description
    pub fn search(&self, query: &str) -> Result<Vec<PackageInfo>> {
        let url = self.url("/api/search");
        let limit = SEARCH_LIMIT.to_string();
        debug!("Searching {} for '{}'", url, query);

        let response = self.send(
            || {
                self.client
                    .get(&url)
                    .query(&[("q", query), ("limit", limit.as_str())])
            },
            "search packages",
        )?;

        if !response.status().is_success() {
            return Err(Error::RegistryError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        response
            .json()
            .map_err(|e| Error::RegistryError(format!("Failed to parse search results: {}", e)))
    }

    /// Upload a package archive with its metadata
    ///
    /// The registry answers 201 on success and 409 when the name and version
    /// are already published.
    pub fn publish(&self, pkg: &Package, tarball: &Path, api_key: &str) -> Result<()> {
        let url = self.url("/api/packages");
        let metadata = serde_json::to_string(pkg)?;

        info!("Publishing {} to {}", pkg.key(), url);

        // Multipart bodies are consumed by send, so publishing is not retried
        let form = multipart::Form::new()
            .text("metadata", metadata)
            .file("file", tarball)
            .map_err(|e| {
                Error::IoError(format!("Failed to read {}: {}", tarball.display(), e))
            })?;

        let response = self
            .client
            .post(&url)
            .header("X-API-Key", api_key)
            .multipart(form)
            .send()
            .map_err(|e| Error::RegistryError(format!("Failed to upload package: {}", e)))?;

        match response.status() {
            StatusCode::CREATED => {
                info!("Published {}", pkg.key());
                Ok(())
            }
            StatusCode::CONFLICT => Err(Error::ConflictError(format!(
                "Package {} v{} already exists",
                pkg.name, pkg.version
            ))),
            status => {
                let body = response.text().unwrap_or_default();
                Err(Error::RegistryError(format!(
                    "Publish failed (HTTP {}): {}",
                    status, body
                )))
            }
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, missing: String) -> Result<T> {
        debug!("GET {}", url);
        let response = self.send(|| self.client.get(url), "query registry")?;

        match response.status() {
            StatusCode::OK => response.json().map_err(|e| {
                Error::RegistryError(format!("Failed to parse response from {}: {}", url, e))
            }),
            StatusCode::NOT_FOUND => Err(Error::NotFoundError(missing)),
            status => Err(Error::RegistryError(format!("HTTP {} from {}", status, url))),
        }
    }
}

impl Registry for RegistryClient {
    fn package_info(&self, name: &str) -> Result<PackageInfo> {
        self.get_json(
            &self.url(&format!("/api/packages/{}", name)),
            format!("Package '{}' not found", name),
        )
    }

    fn package_version(&self, name: &str, version: &str) -> Result<RegistryPackage> {
        self.get_json(
            &self.url(&format!("/api/packages/{}/{}", name, version)),
            format!("Package '{}' version '{}' not found", name, version),
        )
    }

    fn download(&self, pkg: &RegistryPackage, dest_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dest_dir).map_err(|e| {
            Error::IoError(format!("Failed to create directory {}: {}", dest_dir.display(), e))
        })?;

        let dest_path = dest_dir.join(format!("{}-{}.tar.gz", pkg.name, pkg.version));
        info!("Downloading {} to {}", pkg.download_url, dest_path.display());

        let mut response = self.send(|| self.client.get(&pkg.download_url), "download package")?;
        if !response.status().is_success() {
            return Err(Error::RegistryError(format!(
                "Download failed: HTTP {} from {}",
                response.status(),
                pkg.download_url
            )));
        }

        let mut file = File::create(&dest_path).map_err(|e| {
            Error::IoError(format!("Failed to create file {}: {}", dest_path.display(), e))
        })?;
        io::copy(&mut response, &mut file)
            .map_err(|e| Error::IoError(format!("Failed to write downloaded data: {}", e)))?;
        drop(file);

        if let Err(e) = verify_checksum(&dest_path, &pkg.checksum) {
            let _ = fs::remove_file(&dest_path);
            return Err(e);
        }

        Ok(dest_path)
    }
}

/// Compute the hex SHA-256 of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", path.display(), e)))?;

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify a file's SHA-256 against a hex checksum (case-insensitive)
pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(Error::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }

    debug!("Checksum verified for {}", path.display());
    Ok(())
}
