// src/resolver/source.rs

//! Package sources backed by the local store and the registry

use super::PackageSource;
use crate::db::PackageStore;
use crate::error::{Error, Result};
use crate::package::Package;
use crate::repository::Registry;
use crate::version::{Constraint, Version};
use tracing::debug;

/// Picks the highest registry release that satisfies the constraint
pub struct RegistrySource<'a, R: ?Sized> {
    registry: &'a R,
}

impl<'a, R: Registry + ?Sized> RegistrySource<'a, R> {
    pub fn new(registry: &'a R) -> Self {
        Self { registry }
    }
}

impl<R: Registry + ?Sized> PackageSource for RegistrySource<'_, R> {
    fn fetch(&self, name: &str, constraint: &str) -> Result<Package> {
        let parsed = Constraint::parse(constraint)?;
        let info = self.registry.package_info(name)?;

        let (best, _) = parsed
            .best_match(info.versions.iter().map(String::as_str))
            .ok_or_else(|| Error::NoSatisfyingVersion {
                name: name.to_string(),
                constraint: constraint.to_string(),
            })?;

        debug!("Selected {}@{} for constraint {}", name, best, constraint);
        Ok(self.registry.package_version(name, best)?.to_package())
    }
}

/// Serves installed packages that already satisfy the constraint, falling
/// back to another source otherwise
///
/// An installed version inside the range is kept even when the registry has
/// a newer release that would also satisfy it.
pub struct InstalledFirst<'a, S> {
    store: &'a PackageStore,
    fallback: S,
}

impl<'a, S: PackageSource> InstalledFirst<'a, S> {
    pub fn new(store: &'a PackageStore, fallback: S) -> Self {
        Self { store, fallback }
    }

    fn installed_match(&self, name: &str, constraint: &str) -> Result<Option<Package>> {
        if !self.store.is_installed(name)? {
            return Ok(None);
        }

        let installed = self.store.installed_version(name)?;
        let satisfied = match (Constraint::parse(constraint), Version::parse(&installed)) {
            (Ok(c), Ok(v)) => c.satisfies(&v),
            _ => false,
        };

        if !satisfied {
            return Ok(None);
        }

        debug!("Using installed {}@{} for {}", name, installed, constraint);
        Ok(Some(self.store.get(name)?.package))
    }
}

impl<S: PackageSource> PackageSource for InstalledFirst<'_, S> {
    fn fetch(&self, name: &str, constraint: &str) -> Result<Package> {
        match self.installed_match(name, constraint)? {
            Some(pkg) => Ok(pkg),
            None => self.fallback.fetch(name, constraint),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::InstalledPackage;
    use crate::repository::{PackageInfo, RegistryPackage};
    use std::cell::Cell;
    use std::path::{Path, PathBuf};
    use tempfile::NamedTempFile;

    struct FixedRegistry {
        versions: Vec<&'static str>,
        lookups: Cell<usize>,
    }

    impl Registry for FixedRegistry {
        fn package_info(&self, name: &str) -> Result<PackageInfo> {
            self.lookups.set(self.lookups.get() + 1);
            Ok(PackageInfo {
                name: name.to_string(),
                versions: self.versions.iter().map(|v| v.to_string()).collect(),
                ..Default::default()
            })
        }

        fn package_version(&self, name: &str, version: &str) -> Result<RegistryPackage> {
            Ok(RegistryPackage {
                name: name.to_string(),
                version: version.to_string(),
                ..Default::default()
            })
        }

        fn download(&self, _pkg: &RegistryPackage, _dest_dir: &Path) -> Result<PathBuf> {
            unreachable!("resolution never downloads")
        }
    }

    fn registry(versions: Vec<&'static str>) -> FixedRegistry {
        FixedRegistry {
            versions,
            lookups: Cell::new(0),
        }
    }

    #[test]
    fn test_registry_picks_highest_satisfying() {
        let reg = registry(vec!["1.0.0", "1.1.0", "2.0.0", "not-a-version"]);
        let source = RegistrySource::new(&reg);

        assert_eq!(source.fetch("lib", "^1.0.0").unwrap().version, "1.1.0");
        assert_eq!(source.fetch("lib", "*").unwrap().version, "2.0.0");
        assert_eq!(source.fetch("lib", "=1.0.0").unwrap().version, "1.0.0");
    }

    #[test]
    fn test_registry_without_match() {
        let reg = registry(vec!["1.0.0"]);
        let source = RegistrySource::new(&reg);

        assert!(matches!(
            source.fetch("lib", ">=2.0.0"),
            Err(Error::NoSatisfyingVersion { .. })
        ));
        assert!(matches!(
            source.fetch("lib", ">=two"),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_installed_version_is_preferred() {
        let temp = NamedTempFile::new().unwrap();
        let mut store = PackageStore::open(temp.path()).unwrap();
        store
            .install(&InstalledPackage::new(
                Package::new("lib", "1.0.0"),
                PathBuf::from("/opt/cupertino/packages/lib/1.0.0"),
                vec![],
            ))
            .unwrap();

        let reg = registry(vec!["1.0.0", "1.5.0"]);
        let source = InstalledFirst::new(&store, RegistrySource::new(&reg));

        assert_eq!(source.fetch("lib", "^1.0.0").unwrap().version, "1.0.0");
        assert_eq!(reg.lookups.get(), 0);

        // Out of range: ask the registry
        assert_eq!(source.fetch("lib", ">=1.2.0").unwrap().version, "1.5.0");
        assert_eq!(reg.lookups.get(), 1);

        assert_eq!(source.fetch("other", "*").unwrap().version, "1.5.0");
        assert_eq!(reg.lookups.get(), 2);
    }
}
