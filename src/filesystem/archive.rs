// src/filesystem/archive.rs

//! Gzip-compressed tar extraction
//!
//! Every entry name is checked before anything is written: absolute names
//! and names that climb out with `..` abort the whole extraction with
//! `PathTraversal`. Entries extracted before the failing one stay on disk.

use super::{ensure_within, normalize_path};
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::{debug, warn};

/// Extract a `.tar.gz` archive into `dest`
///
/// Directory entries are skipped; parent directories are created for each
/// file. Regular files keep the permission bits recorded in the archive.
/// Links and special files are not extracted. Returns the written files in
/// archive order.
pub fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(archive_path).map_err(|e| {
        Error::IoError(format!("Failed to open {}: {}", archive_path.display(), e))
    })?;

    let mut archive = Archive::new(GzDecoder::new(file));
    let dest = normalize_path(dest);
    let mut written = Vec::new();

    debug!("Extracting {} to {}", archive_path.display(), dest.display());

    let entries = archive
        .entries()
        .map_err(|e| Error::IoError(format!("Failed to read archive: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::IoError(format!("Failed to read archive entry: {}", e)))?;

        let name = entry
            .path()
            .map_err(|e| Error::IoError(format!("Invalid entry name: {}", e)))?
            .into_owned();

        let target = ensure_within(&dest, &name)?;

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            continue;
        }
        if !entry_type.is_file() {
            warn!("Skipping non-regular entry {} ({:?})", name.display(), entry_type);
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::IoError(format!("Failed to create directory {}: {}", parent.display(), e))
            })?;
        }

        let mut out = File::create(&target).map_err(|e| {
            Error::IoError(format!("Failed to create file {}: {}", target.display(), e))
        })?;
        io::copy(&mut entry, &mut out).map_err(|e| {
            Error::IoError(format!("Failed to write {}: {}", target.display(), e))
        })?;
        drop(out);

        let mode = entry
            .header()
            .mode()
            .map_err(|e| Error::IoError(format!("Invalid mode for {}: {}", name.display(), e)))?;
        fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))?;

        written.push(target);
    }

    debug!("Extracted {} files", written.len());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tar::{Builder, EntryType, Header};
    use tempfile::tempdir;

    /// Append an entry without the builder's own path checks
    fn append_raw<W: io::Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) {
        let mut header = Header::new_old();
        let bytes = name.as_bytes();
        header.as_old_mut().name[..bytes.len()].copy_from_slice(bytes);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        builder.append(&header, data).unwrap();
    }

    fn raw_archive(path: &Path, entries: &[(&str, &[u8])]) {
        let enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = Builder::new(enc);
        for (name, data) in entries {
            append_raw(&mut builder, name, data);
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_rejects_parent_traversal() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("evil.tar.gz");
        raw_archive(&archive, &[("../../etc/passwd", b"root::0:0")]);

        let dest = dir.path().join("a/b/dest");
        fs::create_dir_all(&dest).unwrap();

        let result = extract_tar_gz(&archive, &dest);
        assert!(matches!(result, Err(Error::PathTraversal(_))));
        assert!(!dir.path().join("a/etc/passwd").exists());
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn test_rejects_absolute_path() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("evil.tar.gz");
        let outside = dir.path().join("outside.txt");
        let name = outside.to_string_lossy().into_owned();
        raw_archive(&archive, &[(name.as_str(), b"pwned")]);

        let dest = dir.path().join("dest");
        fs::create_dir_all(&dest).unwrap();

        let result = extract_tar_gz(&archive, &dest);
        assert!(matches!(result, Err(Error::PathTraversal(_))));
        assert!(!outside.exists());
    }

    #[test]
    fn test_aborts_at_first_bad_entry() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("mixed.tar.gz");
        raw_archive(
            &archive,
            &[("ok.txt", b"fine"), ("sub/../../escape.txt", b"bad"), ("late.txt", b"never")],
        );

        let dest = dir.path().join("dest");
        let result = extract_tar_gz(&archive, &dest);

        assert!(matches!(result, Err(Error::PathTraversal(_))));
        // Earlier entries are not rolled back
        assert!(dest.join("ok.txt").exists());
        assert!(!dest.join("late.txt").exists());
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_nested_tree_with_permissions() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tool.tar.gz");

        let enc = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
        let mut builder = Builder::new(enc);

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        builder
            .append_data(&mut header, "bin/", io::empty())
            .unwrap();

        for (path, mode, data) in [
            ("package.json", 0o644, &b"{}"[..]),
            ("bin/tool", 0o755, &b"#!/bin/sh\n"[..]),
            ("share/doc/tool/README", 0o600, &b"docs"[..]),
        ] {
            let mut header = Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(mode);
            builder.append_data(&mut header, path, data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();

        let dest = dir.path().join("out");
        let written = extract_tar_gz(&archive, &dest).unwrap();

        assert_eq!(
            written,
            vec![
                dest.join("package.json"),
                dest.join("bin/tool"),
                dest.join("share/doc/tool/README"),
            ]
        );
        assert_eq!(fs::read_to_string(dest.join("share/doc/tool/README")).unwrap(), "docs");

        let mode = |p: &str| fs::metadata(dest.join(p)).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode("package.json"), 0o644);
        assert_eq!(mode("bin/tool"), 0o755);
        assert_eq!(mode("share/doc/tool/README"), 0o600);
    }

    #[test]
    fn test_symlink_entries_are_skipped() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("links.tar.gz");

        let enc = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
        let mut builder = Builder::new(enc);
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        builder
            .append_link(&mut header, "bin/shadow", "/etc/shadow")
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = dir.path().join("out");
        let written = extract_tar_gz(&archive, &dest).unwrap();

        assert!(written.is_empty());
        assert!(fs::symlink_metadata(dest.join("bin/shadow")).is_err());
    }

    #[test]
    fn test_missing_archive() {
        let dir = tempdir().unwrap();
        let result = extract_tar_gz(&dir.path().join("nope.tar.gz"), dir.path());
        assert!(matches!(result, Err(Error::IoError(_))));
    }
}
