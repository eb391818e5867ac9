// src/installer/mod.rs

//! Installation orchestration
//!
//! An install request moves through these phases:
//!
//! ```text
//! Resolving -> Evaluating -> Fetching -> Extracting -> Recording -> Linking -> Done
//! ```
//!
//! Any phase can end in `Failed`. Resolution covers the whole dependency
//! graph; the remaining phases run once per resolved package in
//! dependency-first order. Only the store write is transactional: files
//! copied before a failure stay on disk.

mod remove;
mod upgrade;

pub use remove::{UninstallOutcome, UninstallPlan, plan_uninstall, remove_installed, uninstall};
pub use upgrade::{Upgrade, plan_upgrades};

use crate::config::Layout;
use crate::db::PackageStore;
use crate::error::{Error, Result};
use crate::filesystem::{copy_file, ensure_within, extract_tar_gz, link_binaries};
use crate::package::{InstalledPackage, MANIFEST_FILE, Package};
use crate::repository::{Registry, RegistryPackage};
use crate::resolver::{self, InstalledFirst, RegistrySource};
use crate::version::Version;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Where an install request takes place in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Resolving,
    Evaluating,
    Fetching,
    Extracting,
    Recording,
    Linking,
    Done,
    Failed,
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallPhase::Resolving => "resolving",
            InstallPhase::Evaluating => "evaluating",
            InstallPhase::Fetching => "fetching",
            InstallPhase::Extracting => "extracting",
            InstallPhase::Recording => "recording",
            InstallPhase::Linking => "linking",
            InstallPhase::Done => "done",
            InstallPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What to do with one resolved package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallAction {
    /// The same version is already installed
    Skip,
    /// Nothing is installed under this name
    New,
    Upgrade { from: String },
    Downgrade { from: String },
    /// A different version is installed and one of the two does not parse
    Replace { from: String },
}

impl InstallAction {
    /// Decide how to treat `target` given the installed version, if any
    pub fn evaluate(target: &str, installed: Option<&str>) -> Self {
        let Some(current) = installed else {
            return InstallAction::New;
        };

        if current == target {
            return InstallAction::Skip;
        }

        let from = current.to_string();
        match (Version::parse(target), Version::parse(current)) {
            (Ok(t), Ok(c)) if t > c => InstallAction::Upgrade { from },
            (Ok(t), Ok(c)) if t < c => InstallAction::Downgrade { from },
            _ => InstallAction::Replace { from },
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            InstallAction::Skip => "same version already installed",
            InstallAction::New => "new installation",
            InstallAction::Upgrade { .. } => "upgrade",
            InstallAction::Downgrade { .. } => "downgrade",
            InstallAction::Replace { .. } => "replace",
        }
    }

    /// Installed version that has to go before this install, if any
    pub fn replaces(&self) -> Option<&str> {
        match self {
            InstallAction::Skip | InstallAction::New => None,
            InstallAction::Upgrade { from }
            | InstallAction::Downgrade { from }
            | InstallAction::Replace { from } => Some(from),
        }
    }
}

/// Yes/no answers for destructive operations
pub trait Confirm {
    fn confirm(&self, message: &str) -> bool;
}

/// Answers yes without asking
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _message: &str) -> bool {
        true
    }
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, message: &str) -> bool {
        self(message)
    }
}

/// Outcome for one resolved package
#[derive(Debug, Clone)]
pub struct InstallStep {
    pub package: Package,
    pub action: InstallAction,
    /// Present unless the step was skipped
    pub installed: Option<InstalledPackage>,
    pub links: Vec<PathBuf>,
}

/// Everything an install request did, in install order
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    pub steps: Vec<InstallStep>,
}

impl InstallReport {
    pub fn installed(&self) -> impl Iterator<Item = &InstalledPackage> {
        self.steps.iter().filter_map(|s| s.installed.as_ref())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &Package> {
        self.steps
            .iter()
            .filter(|s| s.action == InstallAction::Skip)
            .map(|s| &s.package)
    }
}

/// Split `name@version` into its parts; the version is optional
pub fn parse_package_spec(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once('@') {
        Some((name, version)) if !version.is_empty() => (name, Some(version)),
        Some((name, _)) => (name, None),
        None => (spec, None),
    }
}

/// Whether an install argument names a local archive rather than a registry package
pub fn is_local_archive(arg: &str) -> bool {
    arg.contains('/') || arg.ends_with(".tar.gz") || arg.ends_with(".tgz")
}

/// Package archives already unpacked on disk, keyed by `name@version`
struct Staged {
    key: String,
    dir: TempDir,
}

/// Runs install requests against one store and registry
pub struct Installer<'a, R: Registry + ?Sized> {
    layout: &'a Layout,
    store: &'a mut PackageStore,
    registry: &'a R,
}

impl<'a, R: Registry + ?Sized> Installer<'a, R> {
    pub fn new(layout: &'a Layout, store: &'a mut PackageStore, registry: &'a R) -> Self {
        Self {
            layout,
            store,
            registry,
        }
    }

    /// Install `name` or `name@version` from the registry
    ///
    /// Without a version the registry's latest release is installed.
    pub fn install_spec(&mut self, spec: &str) -> Result<InstallReport> {
        let release = find_release(self.registry, spec)?;
        self.install_release(&release)
    }

    /// Install a release whose descriptor has already been fetched
    pub fn install_release(&mut self, release: &RegistryPackage) -> Result<InstallReport> {
        info!("Installing {}@{} from registry", release.name, release.version);
        self.install_root(release.to_package(), None)
    }

    /// Install a local `.tar.gz` package archive
    ///
    /// The archive's `package.json` describes the root package; its
    /// dependencies come from the registry.
    pub fn install_archive(&mut self, archive: &Path) -> Result<InstallReport> {
        let dir = tempfile::Builder::new().prefix("cupertino-install-").tempdir()?;
        extract_tar_gz(archive, dir.path())?;

        let manifest_path = dir.path().join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(Error::ManifestError(format!(
                "{} has no {}",
                archive.display(),
                MANIFEST_FILE
            )));
        }
        let root = Package::load(&manifest_path)?;
        install_dir(self.layout, &root)?;

        info!("Installing {} from {}", root.key(), archive.display());
        let staged = Staged {
            key: root.key(),
            dir,
        };
        self.install_root(root, Some(staged))
    }

    fn install_root(&mut self, root: Package, staged: Option<Staged>) -> Result<InstallReport> {
        debug!("{}: {}", root.key(), InstallPhase::Resolving);
        let order = {
            let source = InstalledFirst::new(&*self.store, RegistrySource::new(self.registry));
            resolver::resolve(&root, &source)?
        };

        let mut report = InstallReport::default();
        for pkg in order {
            let local = staged
                .as_ref()
                .filter(|s| s.key == pkg.key())
                .map(|s| s.dir.path());

            let step = self.install_package(pkg, local)?;
            report.steps.push(step);
        }

        Ok(report)
    }

    fn install_package(&mut self, pkg: Package, local: Option<&Path>) -> Result<InstallStep> {
        let key = pkg.key();

        debug!("{}: {}", key, InstallPhase::Evaluating);
        let current = if self.store.has_any_version(&pkg.name)? {
            Some(self.store.installed_version(&pkg.name)?)
        } else {
            None
        };
        let action = InstallAction::evaluate(&pkg.version, current.as_deref());
        info!("{}: {}", key, action.reason());

        if action == InstallAction::Skip {
            return Ok(InstallStep {
                package: pkg,
                action,
                installed: None,
                links: Vec::new(),
            });
        }

        match self.place(&pkg, &action, local) {
            Ok((installed, links)) => {
                debug!("{}: {}", key, InstallPhase::Done);
                Ok(InstallStep {
                    package: pkg,
                    action,
                    installed: Some(installed),
                    links,
                })
            }
            Err(e) => {
                debug!("{}: {}", key, InstallPhase::Failed);
                Err(e)
            }
        }
    }

    fn place(
        &mut self,
        pkg: &Package,
        action: &InstallAction,
        local: Option<&Path>,
    ) -> Result<(InstalledPackage, Vec<PathBuf>)> {
        let key = pkg.key();

        // Downloads and extraction happen in scratch directories that are
        // dropped when this function returns
        debug!("{}: {}", key, InstallPhase::Fetching);
        let fetched;
        let extracted = match local {
            Some(dir) => dir,
            None => {
                fetched = self.fetch(pkg)?;
                fetched.1.path()
            }
        };

        debug!("{}: {}", key, InstallPhase::Extracting);
        let manifest = authoritative_manifest(pkg, extracted)?;
        let install_path = install_dir(self.layout, &manifest)?;
        let copies = declared_files(&manifest, extracted, &install_path)?;

        // The previous version stays until the new one is verified and unpacked
        if let Some(old_version) = action.replaces() {
            info!("Removing {}@{} before installing {}", pkg.name, old_version, key);
            let old = self.store.get(&pkg.name)?;
            remove_installed(self.layout, self.store, &old)?;
        }

        let files = copy_all(&copies)?;
        let installed = InstalledPackage::new(manifest, install_path, files);

        debug!("{}: {}", key, InstallPhase::Recording);
        self.store.install(&installed)?;

        debug!("{}: {}", key, InstallPhase::Linking);
        let links = match link_binaries(&installed, &self.layout.bin_dir()) {
            Ok(links) => links,
            Err(e) => {
                warn!("Failed to link executables for {}: {}", key, e);
                Vec::new()
            }
        };

        info!(
            "Installed {} ({} files)",
            key,
            installed.installed_files.len()
        );
        Ok((installed, links))
    }

    /// Download and unpack a release; returns (download dir, extract dir)
    fn fetch(&self, pkg: &Package) -> Result<(TempDir, TempDir)> {
        let release: RegistryPackage = self.registry.package_version(&pkg.name, &pkg.version)?;

        let download_dir = tempfile::Builder::new().prefix("cupertino-download-").tempdir()?;
        let archive = self.registry.download(&release, download_dir.path())?;

        let extract_dir = tempfile::Builder::new().prefix("cupertino-install-").tempdir()?;
        extract_tar_gz(&archive, extract_dir.path())?;

        Ok((download_dir, extract_dir))
    }
}

/// Prefer the `package.json` shipped inside the archive
///
/// It has to describe the same name and version that was resolved.
fn authoritative_manifest(resolved: &Package, extracted: &Path) -> Result<Package> {
    let path = extracted.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(resolved.clone());
    }

    let manifest = Package::load(&path)?;
    if manifest.name != resolved.name || manifest.version != resolved.version {
        return Err(Error::ManifestError(format!(
            "archive contains {} but {} was requested",
            manifest.key(),
            resolved.key()
        )));
    }

    Ok(manifest)
}

/// Look up the registry release named by `name` or `name@version`
pub fn find_release<R>(registry: &R, spec: &str) -> Result<RegistryPackage>
where
    R: Registry + ?Sized,
{
    let (name, version) = parse_package_spec(spec);
    if name.is_empty() {
        return Err(Error::InvalidFormat(format!("invalid package spec: {}", spec)));
    }

    match version {
        Some(version) => registry.package_version(name, version),
        None => registry.latest(name),
    }
}

/// `<root>/packages/<name>/<version>`, refusing names or versions that are
/// not a single plain path segment
fn install_dir(layout: &Layout, pkg: &Package) -> Result<PathBuf> {
    for part in [&pkg.name, &pkg.version] {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return Err(Error::PathTraversal(pkg.key())),
        }
    }

    ensure_within(
        &layout.packages_dir(),
        &Path::new(&pkg.name).join(&pkg.version),
    )
}

/// Source and destination for every `files` entry, checked before anything is copied
fn declared_files(
    pkg: &Package,
    extracted: &Path,
    install_path: &Path,
) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut copies = Vec::with_capacity(pkg.files.len());

    for (src, dest) in &pkg.files {
        let from = ensure_within(extracted, Path::new(src))?;
        let to = ensure_within(install_path, Path::new(dest))?;

        if !from.is_file() {
            return Err(Error::ManifestError(format!(
                "{} lists {} but the archive does not contain it",
                pkg.key(),
                src
            )));
        }

        copies.push((from, to));
    }

    Ok(copies)
}

fn copy_all(copies: &[(PathBuf, PathBuf)]) -> Result<Vec<PathBuf>> {
    let mut installed = Vec::with_capacity(copies.len());

    for (from, to) in copies {
        copy_file(from, to)?;
        debug!("Copied {} -> {}", from.display(), to.display());
        installed.push(to.clone());
    }

    Ok(installed)
}
