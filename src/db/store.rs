// src/db/store.rs

//! Local package store
//!
//! Keeps package metadata, installed file lists, dependency edges and
//! lifecycle scripts consistent with each other. Every write goes through a
//! single transaction, so a failed install or remove leaves the previous
//! state untouched.
//!
//! The store assumes one process mutates it at a time; concurrent installs
//! of the same name end as "last writer wins".

use crate::db::models::{DependencyEntry, FileEntry, PackageRecord, ScriptEntry, ScriptType};
use crate::db::{self, schema};
use crate::error::{Error, Result};
use crate::package::{InstalledPackage, Package};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// SQLite-backed record of installed packages
pub struct PackageStore {
    conn: Connection,
}

impl PackageStore {
    /// Open the store at `db_path`, creating and migrating it when needed
    pub fn open(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            db::init(db_path)?;
        }

        let conn = db::open(db_path)?;
        debug!("Opened package store at {}", db_path.display());
        Self::from_connection(conn)
    }

    /// Wrap an already configured connection (foreign keys on, schema migrated)
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Record an installed package, replacing any previous row for its name
    pub fn install(&mut self, pkg: &InstalledPackage) -> Result<()> {
        let name = pkg.name().to_string();
        let record = PackageRecord {
            name: name.clone(),
            version: pkg.package.version.clone(),
            description: pkg.package.description.clone(),
            homepage: pkg.package.homepage.clone(),
            license: pkg.package.license.clone(),
            install_path: path_to_string(&pkg.install_path),
            install_date: pkg.installed_at.to_rfc3339(),
        };

        db::transaction(&mut self.conn, |tx| {
            PackageRecord::delete_children(tx, &name)?;
            record.upsert(tx)?;

            for path in &pkg.installed_files {
                FileEntry::new(name.clone(), path_to_string(path)).insert(tx)?;
            }

            for (dep_name, constraint) in &pkg.package.dependencies {
                DependencyEntry::new(name.clone(), dep_name.clone(), constraint.clone())
                    .insert(tx)?;
            }

            for (kind, content) in pkg.package.scripts() {
                let script_type = kind.parse::<ScriptType>().map_err(Error::ManifestError)?;
                ScriptEntry::new(name.clone(), script_type, content.to_string()).insert(tx)?;
            }

            Ok(())
        })?;

        info!(
            "Recorded {} v{} ({} files, {} dependencies)",
            name,
            pkg.version(),
            pkg.installed_files.len(),
            pkg.package.dependencies.len()
        );
        Ok(())
    }

    /// Reconstruct an installed package with its files, dependencies and scripts
    pub fn get(&self, name: &str) -> Result<InstalledPackage> {
        let record = PackageRecord::find_by_name(&self.conn, name)?
            .ok_or_else(|| Error::NotFoundError(format!("Package '{}' is not installed", name)))?;

        self.assemble(record)
    }

    /// All installed packages ordered by name
    pub fn list(&self) -> Result<Vec<InstalledPackage>> {
        PackageRecord::list_all(&self.conn)?
            .into_iter()
            .map(|record| self.assemble(record))
            .collect()
    }

    /// Delete a package and everything it owns
    ///
    /// Returns whether a row was removed.
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let deleted = db::transaction(&mut self.conn, |tx| {
            PackageRecord::delete_children(tx, name)?;
            PackageRecord::delete(tx, name)
        })?;

        if deleted > 0 {
            info!("Removed {} from the package store", name);
        }
        Ok(deleted > 0)
    }

    pub fn is_installed(&self, name: &str) -> Result<bool> {
        PackageRecord::exists(&self.conn, name)
    }

    /// Name-level existence, whichever version is installed
    pub fn has_any_version(&self, name: &str) -> Result<bool> {
        PackageRecord::exists(&self.conn, name)
    }

    pub fn installed_version(&self, name: &str) -> Result<String> {
        PackageRecord::find_version(&self.conn, name)?
            .ok_or_else(|| Error::NotFoundError(format!("Package '{}' is not installed", name)))
    }

    pub fn is_installed_version(&self, name: &str, version: &str) -> Result<bool> {
        Ok(PackageRecord::find_version(&self.conn, name)?.as_deref() == Some(version))
    }

    /// Installed packages that declare a dependency on `name`
    pub fn dependents(&self, name: &str) -> Result<Vec<InstalledPackage>> {
        PackageRecord::find_dependent_names(&self.conn, name)?
            .iter()
            .map(|dependent| self.get(dependent))
            .collect()
    }

    /// Installed packages that `name` depends on; edges to missing packages are skipped
    pub fn dependencies(&self, name: &str) -> Result<Vec<InstalledPackage>> {
        let mut installed = Vec::new();
        for edge in DependencyEntry::find_by_package(&self.conn, name)? {
            if let Some(record) = PackageRecord::find_by_name(&self.conn, &edge.dependency_name)? {
                installed.push(self.assemble(record)?);
            }
        }
        Ok(installed)
    }

    fn assemble(&self, record: PackageRecord) -> Result<InstalledPackage> {
        let installed_files = FileEntry::find_by_package(&self.conn, &record.name)?
            .into_iter()
            .map(|f| PathBuf::from(f.file_path))
            .collect();

        let dependencies = DependencyEntry::find_by_package(&self.conn, &record.name)?
            .into_iter()
            .map(|d| (d.dependency_name, d.version_constraint))
            .collect();

        let mut package = Package {
            name: record.name,
            version: record.version,
            description: record.description,
            homepage: record.homepage,
            license: record.license,
            dependencies,
            ..Default::default()
        };

        for script in ScriptEntry::find_by_package(&self.conn, &package.name)? {
            let target = match script.script_type {
                ScriptType::PreInstall => &mut package.pre_install,
                ScriptType::PostInstall => &mut package.post_install,
                ScriptType::PreRemove => &mut package.pre_remove,
                ScriptType::PostRemove => &mut package.post_remove,
            };
            target.push(script.script_content);
        }

        let installed_at = DateTime::parse_from_rfc3339(&record.install_date)
            .map_err(|e| {
                Error::InvalidFormat(format!(
                    "install date '{}' for {}: {}",
                    record.install_date, package.name, e
                ))
            })?
            .with_timezone(&Utc);

        Ok(InstalledPackage {
            package,
            install_path: PathBuf::from(record.install_path),
            installed_files,
            installed_at,
        })
    }
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (NamedTempFile, PackageStore) {
        let temp_file = NamedTempFile::new().unwrap();
        let store = PackageStore::open(temp_file.path()).unwrap();
        (temp_file, store)
    }

    fn installed(name: &str, version: &str, deps: &[(&str, &str)]) -> InstalledPackage {
        let mut package = Package::new(name, version);
        package.description = format!("The {} package", name);
        for (dep, constraint) in deps {
            package.dependencies.insert(dep.to_string(), constraint.to_string());
        }

        let root = PathBuf::from(format!("/opt/cupertino/packages/{}/{}", name, version));
        let files = vec![root.join("bin").join(name), root.join("README.md")];
        InstalledPackage::new(package, root, files)
    }

    #[test]
    fn test_install_then_get() {
        let (_temp, mut store) = create_test_store();
        let mut pkg = installed("git", "2.42.0", &[("openssl", ">=1.1.0"), ("zlib", "*")]);
        pkg.package.post_install = vec!["git --version".to_string()];
        pkg.package.homepage = Some("https://git-scm.com".to_string());

        store.install(&pkg).unwrap();

        assert!(store.is_installed("git").unwrap());
        assert!(store.has_any_version("git").unwrap());

        let fetched = store.get("git").unwrap();
        assert_eq!(fetched.installed_files, pkg.installed_files);
        assert_eq!(fetched.package.dependencies, pkg.package.dependencies);
        assert_eq!(fetched.package.post_install, pkg.package.post_install);
        assert_eq!(fetched.package.homepage, pkg.package.homepage);
        assert_eq!(fetched.install_path, pkg.install_path);
        assert_eq!(fetched.installed_at.timestamp(), pkg.installed_at.timestamp());
    }

    #[test]
    fn test_get_missing_package() {
        let (_temp, store) = create_test_store();
        assert!(matches!(store.get("nope"), Err(Error::NotFoundError(_))));
        assert!(matches!(
            store.installed_version("nope"),
            Err(Error::NotFoundError(_))
        ));
        assert!(!store.is_installed("nope").unwrap());
    }

    #[test]
    fn test_reinstall_replaces_files_and_edges() {
        let (_temp, mut store) = create_test_store();
        store
            .install(&installed("git", "2.41.0", &[("openssl", ">=1.0.0")]))
            .unwrap();

        let newer = installed("git", "2.42.0", &[("zlib", "^1.0.0")]);
        store.install(&newer).unwrap();

        let fetched = store.get("git").unwrap();
        assert_eq!(fetched.version(), "2.42.0");
        assert_eq!(fetched.installed_files, newer.installed_files);
        assert!(!fetched.package.dependencies.contains_key("openssl"));
        assert!(store.dependents("openssl").unwrap().is_empty());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_versions() {
        let (_temp, mut store) = create_test_store();
        store.install(&installed("curl", "8.0.0", &[])).unwrap();

        assert_eq!(store.installed_version("curl").unwrap(), "8.0.0");
        assert!(store.is_installed_version("curl", "8.0.0").unwrap());
        assert!(!store.is_installed_version("curl", "8.0.1").unwrap());
        assert!(!store.is_installed_version("wget", "8.0.0").unwrap());
    }

    #[test]
    fn test_list_is_ordered_by_name() {
        let (_temp, mut store) = create_test_store();
        for name in ["zlib", "curl", "openssl"] {
            store.install(&installed(name, "1.0.0", &[])).unwrap();
        }

        let names: Vec<_> = store
            .list()
            .unwrap()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["curl", "openssl", "zlib"]);
    }

    #[test]
    fn test_dependents_and_dependencies() {
        let (_temp, mut store) = create_test_store();
        store.install(&installed("openssl", "3.0.0", &[])).unwrap();
        store
            .install(&installed("git", "2.42.0", &[("openssl", ">=1.1.0"), ("pcre", "*")]))
            .unwrap();
        store
            .install(&installed("curl", "8.0.0", &[("openssl", "^3.0.0")]))
            .unwrap();

        let dependents: Vec<_> = store
            .dependents("openssl")
            .unwrap()
            .into_iter()
            .map(|p| p.package.name)
            .collect();
        assert_eq!(dependents, vec!["curl", "git"]);

        // pcre is declared but not installed, so it is left out
        let deps = store.dependencies("git").unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name(), "openssl");
    }

    #[test]
    fn test_remove_leaves_no_rows_behind() {
        let (_temp, mut store) = create_test_store();
        let mut pkg = installed("git", "2.42.0", &[("openssl", "*")]);
        pkg.package.pre_remove = vec!["echo bye".to_string()];
        store.install(&pkg).unwrap();

        assert!(store.remove("git").unwrap());
        assert!(!store.is_installed("git").unwrap());
        assert!(store.dependents("openssl").unwrap().is_empty());

        for table in ["package_files", "dependencies", "package_scripts"] {
            let count: i64 = store
                .conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {} WHERE package_name = 'git'", table),
                    [],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 0, "orphan rows in {}", table);
        }

        assert!(!store.remove("git").unwrap());
    }

    #[test]
    fn test_failed_install_keeps_previous_state() {
        let (_temp, mut store) = create_test_store();
        let original = installed("git", "2.41.0", &[]);
        store.install(&original).unwrap();

        // Force the next install to fail partway through
        store.conn.execute_batch("DROP TABLE package_scripts;").unwrap();

        let mut replacement = installed("git", "2.42.0", &[]);
        replacement.package.post_install = vec!["true".to_string()];
        assert!(store.install(&replacement).is_err());

        // get() reads scripts too, so check the raw rows
        let version: String = store
            .conn
            .query_row("SELECT version FROM packages WHERE name = 'git'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, "2.41.0");

        let files: i64 = store
            .conn
            .query_row(
                "SELECT COUNT(*) FROM package_files WHERE package_name = 'git'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(files, original.installed_files.len() as i64);
    }

    #[test]
    fn test_from_connection() {
        let conn = Connection::open_in_memory().unwrap();
        let mut store = PackageStore::from_connection(conn).unwrap();
        store.install(&installed("tool", "0.1.0", &[])).unwrap();
        assert!(store.is_installed("tool").unwrap());
    }
}
