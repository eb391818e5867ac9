// src/installer/upgrade.rs

//! Upgrade planning against the registry's latest releases

use crate::db::PackageStore;
use crate::error::{Error, Result};
use crate::repository::Registry;
use tracing::warn;

/// An installed package whose registry `latest` differs from what is installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upgrade {
    pub name: String,
    pub from: String,
    pub to: String,
}

impl Upgrade {
    /// Install spec for the target release
    pub fn spec(&self) -> String {
        format!("{}@{}", self.name, self.to)
    }
}

/// Compare installed versions with the registry
///
/// With a name, only that package is checked and registry failures are
/// returned. Without one, every installed package is checked and packages
/// the registry cannot answer for are skipped.
pub fn plan_upgrades<R>(
    store: &PackageStore,
    registry: &R,
    name: Option<&str>,
) -> Result<Vec<Upgrade>>
where
    R: Registry + ?Sized,
{
    let candidates: Vec<(String, String)> = match name {
        Some(name) => {
            if !store.has_any_version(name)? {
                return Err(Error::NotFoundError(format!(
                    "Package '{}' is not installed",
                    name
                )));
            }
            vec![(name.to_string(), store.installed_version(name)?)]
        }
        None => store
            .list()?
            .into_iter()
            .map(|p| (p.package.name, p.package.version))
            .collect(),
    };

    let mut upgrades = Vec::new();
    for (pkg_name, installed) in candidates {
        let latest = match registry.package_info(&pkg_name) {
            Ok(info) => info.latest,
            Err(e) if name.is_none() => {
                warn!("Skipping {}: {}", pkg_name, e);
                continue;
            }
            Err(e) => return Err(e),
        };

        if latest.is_empty() || latest == installed {
            continue;
        }

        upgrades.push(Upgrade {
            name: pkg_name,
            from: installed,
            to: latest,
        });
    }

    Ok(upgrades)
}
