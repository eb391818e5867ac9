// src/publish.rs

//! Authoring packages: `init` scaffolding and `publish` archives

use crate::error::{Error, Result};
use crate::filesystem::ensure_within;
use crate::package::{MANIFEST_FILE, Package};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::Builder;
use tracing::{debug, info};

/// Answers collected by `init`
#[derive(Debug, Clone, Default)]
pub struct InitAnswers {
    pub name: String,
    pub version: String,
    pub description: String,
    pub license: String,
    pub homepage: String,
}

/// Regular files directly under `<dir>/bin`, each mapped to the same path
pub fn scan_bin_files(dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();

    let entries = match fs::read_dir(dir.join("bin")) {
        Ok(entries) => entries,
        Err(_) => return Ok(files),
    };

    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }

        let path = format!("bin/{}", entry.file_name().to_string_lossy());
        debug!("Found {}", path);
        files.insert(path.clone(), path);
    }

    Ok(files)
}

/// Write a new `package.json` into `dir`
///
/// Refuses to overwrite an existing manifest. `files` should come from
/// [`scan_bin_files`] plus anything the user added by hand.
pub fn init_manifest(
    dir: &Path,
    answers: InitAnswers,
    files: BTreeMap<String, String>,
) -> Result<Package> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if manifest_path.exists() {
        return Err(Error::ManifestError(format!(
            "{} already exists in this directory",
            MANIFEST_FILE
        )));
    }

    let optional = |value: String| (!value.is_empty()).then_some(value);
    let pkg = Package {
        name: answers.name,
        version: answers.version,
        description: answers.description,
        license: optional(answers.license),
        homepage: optional(answers.homepage),
        files,
        ..Default::default()
    };

    pkg.save(&manifest_path)?;
    info!("Created {} for {}", manifest_path.display(), pkg.key());
    Ok(pkg)
}

/// Load and validate the manifest in `dir` for publishing
///
/// Every source listed under `files` has to exist inside `dir`.
pub fn load_for_publish(dir: &Path) -> Result<Package> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        return Err(Error::ManifestError(format!(
            "no {} found in {} (run 'cupertino init' to create one)",
            MANIFEST_FILE,
            dir.display()
        )));
    }

    let pkg = Package::load(&manifest_path)?;
    pkg.validate_for_publish()?;

    for src in pkg.files.keys() {
        let path = ensure_within(dir, Path::new(src))?;
        if !path.is_file() {
            return Err(Error::NotFoundError(format!("file '{}' not found", src)));
        }
    }

    Ok(pkg)
}

/// Name of the archive built for a package
pub fn tarball_name(pkg: &Package) -> String {
    format!("{}-{}.tar.gz", pkg.name, pkg.version)
}

/// Pack `package.json` and every listed source from `dir` into `out_dir`
pub fn build_tarball(dir: &Path, pkg: &Package, out_dir: &Path) -> Result<PathBuf> {
    let out_path = out_dir.join(tarball_name(pkg));
    info!("Building {}", out_path.display());

    let file = File::create(&out_path).map_err(|e| {
        Error::IoError(format!("Failed to create {}: {}", out_path.display(), e))
    })?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));

    builder.append_path_with_name(dir.join(MANIFEST_FILE), MANIFEST_FILE)?;
    for src in pkg.files.keys() {
        let path = ensure_within(dir, Path::new(src))?;
        builder.append_path_with_name(&path, src)?;
    }

    builder.into_inner()?.finish()?;
    Ok(out_path)
}
