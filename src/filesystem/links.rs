// src/filesystem/links.rs

//! Symlink farm for installed executables
//!
//! Files installed under a `bin` directory of a package get a symlink of the
//! same file name in the shared bin directory.

use crate::error::{Error, Result};
use crate::package::InstalledPackage;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Installed files that belong in the bin directory, with their link paths
fn binaries<'a>(
    pkg: &'a InstalledPackage,
    bin_dir: &'a Path,
) -> impl Iterator<Item = (&'a PathBuf, PathBuf)> + 'a {
    pkg.installed_files.iter().filter_map(move |file| {
        let rel = file.strip_prefix(&pkg.install_path).unwrap_or(file);
        let in_bin = rel
            .parent()
            .is_some_and(|p| p.components().any(|c| c == Component::Normal("bin".as_ref())));

        if !in_bin {
            return None;
        }
        file.file_name().map(|name| (file, bin_dir.join(name)))
    })
}

/// Link a package's executables into `bin_dir`
///
/// A link that already exists under the same name is replaced. If any link
/// cannot be created, the links made by this call are removed again before
/// the error is returned.
pub fn link_binaries(pkg: &InstalledPackage, bin_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(bin_dir).map_err(|e| {
        Error::IoError(format!("Failed to create {}: {}", bin_dir.display(), e))
    })?;

    let mut created: Vec<PathBuf> = Vec::new();

    for (file, link) in binaries(pkg, bin_dir) {
        if let Err(e) = replace_link(file, &link) {
            for made in &created {
                let _ = fs::remove_file(made);
            }
            return Err(e);
        }

        info!("Linked {} -> {}", link.display(), file.display());
        created.push(link);
    }

    Ok(created)
}

fn replace_link(file: &Path, link: &Path) -> Result<()> {
    if let Ok(meta) = fs::symlink_metadata(link) {
        if meta.file_type().is_symlink() {
            debug!("Replacing stale link {}", link.display());
            fs::remove_file(link)?;
        }
    }

    symlink(file, link).map_err(|e| {
        Error::IoError(format!("Failed to create symlink {}: {}", link.display(), e))
    })
}

/// Remove the links that point at this package's executables
///
/// Links that now point somewhere else (another package took the name) are
/// left alone. Returns the removed links.
pub fn unlink_binaries(pkg: &InstalledPackage, bin_dir: &Path) -> Vec<PathBuf> {
    let mut removed = Vec::new();

    for (file, link) in binaries(pkg, bin_dir) {
        match fs::read_link(&link) {
            Ok(target) if target == *file => match fs::remove_file(&link) {
                Ok(()) => {
                    debug!("Removed link {}", link.display());
                    removed.push(link);
                }
                Err(e) => warn!("Failed to remove link {}: {}", link.display(), e),
            },
            _ => {}
        }
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Package;
    use tempfile::tempdir;

    fn package_with_files(root: &Path, files: &[&str]) -> InstalledPackage {
        let install_path = root.join("packages/tool/1.0.0");
        let installed_files: Vec<PathBuf> = files.iter().map(|f| install_path.join(f)).collect();
        for file in &installed_files {
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, "x").unwrap();
        }
        InstalledPackage::new(Package::new("tool", "1.0.0"), install_path, installed_files)
    }

    #[test]
    fn test_links_only_bin_files() {
        let root = tempdir().unwrap();
        let bin_dir = root.path().join("bin");
        let pkg = package_with_files(
            root.path(),
            &["bin/tool", "libexec/bin/helper", "share/tool/README"],
        );

        let links = link_binaries(&pkg, &bin_dir).unwrap();

        assert_eq!(links, vec![bin_dir.join("tool"), bin_dir.join("helper")]);
        assert_eq!(fs::read_link(bin_dir.join("tool")).unwrap(), pkg.installed_files[0]);
        assert!(!bin_dir.join("README").exists());
    }

    #[test]
    fn test_stale_link_is_replaced() {
        let root = tempdir().unwrap();
        let bin_dir = root.path().join("bin");
        fs::create_dir_all(&bin_dir).unwrap();
        symlink("/nonexistent/old/tool", bin_dir.join("tool")).unwrap();

        let pkg = package_with_files(root.path(), &["bin/tool"]);
        link_binaries(&pkg, &bin_dir).unwrap();

        assert_eq!(fs::read_link(bin_dir.join("tool")).unwrap(), pkg.installed_files[0]);
    }

    #[test]
    fn test_failed_link_rolls_back() {
        let root = tempdir().unwrap();
        let bin_dir = root.path().join("bin");
        // A regular file (not a link) blocks the second name
        fs::create_dir_all(&bin_dir).unwrap();
        fs::write(bin_dir.join("zz-blocked"), "mine").unwrap();

        let pkg = package_with_files(root.path(), &["bin/aa-first", "bin/zz-blocked"]);
        let result = link_binaries(&pkg, &bin_dir);

        assert!(result.is_err());
        assert!(fs::symlink_metadata(bin_dir.join("aa-first")).is_err());
        assert_eq!(fs::read_to_string(bin_dir.join("zz-blocked")).unwrap(), "mine");
    }

    #[test]
    fn test_unlink_only_own_links() {
        let root = tempdir().unwrap();
        let bin_dir = root.path().join("bin");
        let pkg = package_with_files(root.path(), &["bin/tool", "bin/shared"]);
        link_binaries(&pkg, &bin_dir).unwrap();

        // Another package took over `shared`
        fs::remove_file(bin_dir.join("shared")).unwrap();
        symlink("/opt/elsewhere/shared", bin_dir.join("shared")).unwrap();

        let removed = unlink_binaries(&pkg, &bin_dir);

        assert_eq!(removed, vec![bin_dir.join("tool")]);
        assert!(fs::symlink_metadata(bin_dir.join("tool")).is_err());
        assert_eq!(
            fs::read_link(bin_dir.join("shared")).unwrap(),
            PathBuf::from("/opt/elsewhere/shared")
        );
    }
}
