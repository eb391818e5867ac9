// src/filesystem/mod.rs

//! Filesystem operations for package installs
//!
//! Path containment checks, single-file copies that keep permission bits,
//! removal of installed files, and pruning of directories left empty after
//! an uninstall. Archive extraction and the `bin` symlink farm live in the
//! submodules.

pub mod archive;
pub mod links;

pub use archive::extract_tar_gz;
pub use links::{link_binaries, unlink_binaries};

use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Lexically clean a path: drop `.`, fold `name/..`, keep leading `..`
///
/// Nothing is read from disk, so symlinks are not followed.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `..` at the root is the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    out.iter().collect()
}

/// Reject relative paths that are absolute or climb out of their base
pub fn validate_relative(name: &Path) -> Result<PathBuf> {
    let cleaned = normalize_path(name);

    if cleaned.has_root() || cleaned.is_absolute() {
        return Err(Error::PathTraversal(name.display().to_string()));
    }

    if matches!(cleaned.components().next(), Some(Component::ParentDir)) {
        return Err(Error::PathTraversal(name.display().to_string()));
    }

    Ok(cleaned)
}

/// Join `rel` onto `base` and check the cleaned result stays inside `base`
pub fn ensure_within(base: &Path, rel: &Path) -> Result<PathBuf> {
    let rel = validate_relative(rel)?;
    let base = normalize_path(base);
    let target = normalize_path(&base.join(&rel));

    if !target.starts_with(&base) {
        return Err(Error::PathTraversal(rel.display().to_string()));
    }

    Ok(target)
}

/// Copy one file, creating parent directories and keeping the source's permissions
pub fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::IoError(format!("Failed to create directory {}: {}", parent.display(), e))
        })?;
    }

    fs::copy(src, dest).map_err(|e| {
        Error::IoError(format!(
            "Failed to copy {} to {}: {}",
            src.display(),
            dest.display(),
            e
        ))
    })?;

    // fs::copy already carries the mode over on Unix; this also covers
    // destinations that existed with a different mode
    let permissions = fs::metadata(src)?.permissions();
    fs::set_permissions(dest, permissions)?;

    debug!("Copied {} -> {}", src.display(), dest.display());
    Ok(())
}

/// Delete installed files, tolerating ones that are already gone
///
/// Returns how many files were actually removed.
pub fn remove_files(files: &[PathBuf]) -> Result<usize> {
    let mut removed = 0;

    for file in files {
        match fs::remove_file(file) {
            Ok(()) => {
                debug!("Removed {}", file.display());
                removed += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("{} was already removed", file.display());
            }
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to remove {}: {}",
                    file.display(),
                    e
                )));
            }
        }
    }

    Ok(removed)
}

/// Remove `start` and its ancestors while they are empty, stopping at `root`
///
/// `root` itself is never removed, and nothing outside it is touched.
/// Returns the directories that were removed.
pub fn cleanup_empty_dirs(start: &Path, root: &Path) -> Vec<PathBuf> {
    let root = normalize_path(root);
    let mut dir = normalize_path(start);
    let mut removed = Vec::new();

    while dir != root && dir.starts_with(&root) {
        let empty = match fs::read_dir(&dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => false,
        };

        if !empty || fs::remove_dir(&dir).is_err() {
            break;
        }

        debug!("Removed empty directory {}", dir.display());
        removed.push(dir.clone());

        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => break,
        }
    }

    removed
}
