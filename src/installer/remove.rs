// src/installer/remove.rs

//! Uninstalling packages

use super::Confirm;
use crate::config::Layout;
use crate::db::PackageStore;
use crate::error::{Error, Result};
use crate::filesystem::{cleanup_empty_dirs, remove_files, unlink_binaries};
use crate::package::InstalledPackage;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::info;

/// A pending uninstall and the installed packages that still depend on it
#[derive(Debug, Clone)]
pub struct UninstallPlan {
    pub package: InstalledPackage,
    pub dependents: Vec<InstalledPackage>,
}

impl UninstallPlan {
    /// Confirmation question for this uninstall
    pub fn prompt(&self) -> String {
        if self.dependents.is_empty() {
            return format!("Remove {}?", self.package.name());
        }

        let mut message = format!(
            "Cannot uninstall '{}' - the following packages are dependents:\n",
            self.package.name()
        );
        for dependent in &self.dependents {
            message.push_str(&format!("  - {} {}\n", dependent.name(), dependent.version()));
        }
        message.push_str("Uninstall anyway? (This may break dependent packages)");
        message
    }
}

#[derive(Debug, Clone)]
pub enum UninstallOutcome {
    Removed {
        package: InstalledPackage,
        files_removed: usize,
    },
    Cancelled,
}

/// Look up what uninstalling `name` would affect
pub fn plan_uninstall(store: &PackageStore, name: &str) -> Result<UninstallPlan> {
    if !store.has_any_version(name)? {
        return Err(Error::NotFoundError(format!(
            "Package '{}' is not installed",
            name
        )));
    }

    Ok(UninstallPlan {
        package: store.get(name)?,
        dependents: store.dependents(name)?,
    })
}

/// Uninstall `name` after asking `confirm`
///
/// When other installed packages depend on it the question says so; a "no"
/// leaves everything in place.
pub fn uninstall(
    layout: &Layout,
    store: &mut PackageStore,
    name: &str,
    confirm: &dyn Confirm,
) -> Result<UninstallOutcome> {
    let plan = plan_uninstall(store, name)?;

    if !confirm.confirm(&plan.prompt()) {
        info!("Uninstall of {} cancelled", name);
        return Ok(UninstallOutcome::Cancelled);
    }

    let files_removed = remove_installed(layout, store, &plan.package)?;
    Ok(UninstallOutcome::Removed {
        package: plan.package,
        files_removed,
    })
}

/// Delete an installed package's files, links and store record
///
/// Missing files are skipped. Directories left empty are pruned up to, but
/// not including, the install root. Returns the number of files deleted.
pub fn remove_installed(
    layout: &Layout,
    store: &mut PackageStore,
    pkg: &InstalledPackage,
) -> Result<usize> {
    info!("Uninstalling {} v{}", pkg.name(), pkg.version());

    let removed = remove_files(&pkg.installed_files)?;

    let mut dirs: BTreeSet<PathBuf> = pkg
        .installed_files
        .iter()
        .filter_map(|f| f.parent().map(|p| p.to_path_buf()))
        .collect();
    dirs.insert(pkg.install_path.clone());

    // Deepest first so parents are seen after their children empty out
    for dir in dirs.iter().rev() {
        cleanup_empty_dirs(dir, layout.root());
    }

    unlink_binaries(pkg, &layout.bin_dir());
    store.remove(pkg.name())?;

    info!("Uninstalled {} ({} files)", pkg.name(), removed);
    Ok(removed)
}
