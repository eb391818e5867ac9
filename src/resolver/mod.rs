// src/resolver/mod.rs

//! Dependency resolution
//!
//! Walks the dependency mapping of a root package depth-first and produces a
//! dependency-first install order. Packages are keyed by `name@version`; a
//! key seen again while it is still on the walk stack is a cycle.
//!
//! Packages are obtained through a [`PackageSource`], so the same walk works
//! against the local store, the registry, or a fixed set of packages in tests.

mod source;

pub use source::{InstalledFirst, RegistrySource};

use crate::error::{Error, Result};
use crate::package::Package;
use std::collections::HashMap;
use tracing::debug;

/// Produces the package that should satisfy `name` under `constraint`
pub trait PackageSource {
    fn fetch(&self, name: &str, constraint: &str) -> Result<Package>;
}

impl<F> PackageSource for F
where
    F: Fn(&str, &str) -> Result<Package>,
{
    fn fetch(&self, name: &str, constraint: &str) -> Result<Package> {
        self(name, constraint)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Resolved,
}

/// Depth-first resolver state for a single resolution
struct Walk<'s, S: ?Sized> {
    source: &'s S,
    states: HashMap<String, VisitState>,
    /// Keys currently being visited, outermost first
    stack: Vec<String>,
    order: Vec<Package>,
}

impl<S: PackageSource + ?Sized> Walk<'_, S> {
    fn visit(&mut self, pkg: Package) -> Result<()> {
        let key = pkg.key();

        match self.states.get(&key) {
            Some(VisitState::Visiting) => {
                let start = self.stack.iter().position(|k| *k == key).unwrap_or(0);
                let mut cycle = self.stack[start..].to_vec();
                cycle.push(key);
                return Err(Error::CircularDependency(cycle.join(" -> ")));
            }
            Some(VisitState::Resolved) => return Ok(()),
            None => {}
        }

        self.states.insert(key.clone(), VisitState::Visiting);
        self.stack.push(key.clone());

        for (dep_name, constraint) in &pkg.dependencies {
            debug!("{} requires {} {}", key, dep_name, constraint);
            let dep = self.source.fetch(dep_name, constraint)?;
            self.visit(dep)?;
        }

        self.stack.pop();
        self.states.insert(key, VisitState::Resolved);
        self.order.push(pkg);
        Ok(())
    }
}

/// Resolve `root` and everything it depends on
///
/// The returned order is dependency-first: no package precedes any of its
/// transitive dependencies, and `root` is always last. Each `name@version`
/// appears once even when several packages depend on it.
pub fn resolve<S>(root: &Package, source: &S) -> Result<Vec<Package>>
where
    S: PackageSource + ?Sized,
{
    let mut walk = Walk {
        source,
        states: HashMap::new(),
        stack: Vec::new(),
        order: Vec::new(),
    };

    walk.visit(root.clone())?;

    debug!(
        "Resolved {} into {} packages",
        root.key(),
        walk.order.len()
    );
    Ok(walk.order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Constraint;
    use std::cell::RefCell;

    /// Fixed set of available packages, best match wins
    struct Catalog {
        packages: Vec<Package>,
        fetches: RefCell<Vec<String>>,
    }

    impl Catalog {
        fn new(packages: Vec<Package>) -> Self {
            Self {
                packages,
                fetches: RefCell::new(Vec::new()),
            }
        }
    }

    impl PackageSource for Catalog {
        fn fetch(&self, name: &str, constraint: &str) -> Result<Package> {
            self.fetches.borrow_mut().push(name.to_string());
            let parsed = Constraint::parse(constraint)?;
            let candidates = self
                .packages
                .iter()
                .filter(|p| p.name == name)
                .map(|p| p.version.as_str());

            let (version, _) = parsed.best_match(candidates).ok_or_else(|| {
                Error::NoSatisfyingVersion {
                    name: name.to_string(),
                    constraint: constraint.to_string(),
                }
            })?;

            Ok(self
                .packages
                .iter()
                .find(|p| p.name == name && p.version == version)
                .cloned()
                .unwrap())
        }
    }

    fn names(order: &[Package]) -> Vec<String> {
        order.iter().map(|p| p.key()).collect()
    }

    #[test]
    fn test_no_dependencies() {
        let root = Package::new("solo", "1.0.0");
        let catalog = Catalog::new(vec![]);

        let order = resolve(&root, &catalog).unwrap();
        assert_eq!(names(&order), vec!["solo@1.0.0"]);
        assert!(catalog.fetches.borrow().is_empty());
    }

    #[test]
    fn test_diamond_resolves_shared_dependency_once() {
        let root = Package::new("a", "1.0.0")
            .with_dependency("b", "^1.0.0")
            .with_dependency("c", "*");
        let catalog = Catalog::new(vec![
            Package::new("b", "1.0.0").with_dependency("d", ">=1.0.0"),
            Package::new("c", "1.0.0").with_dependency("d", "^1.0.0"),
            Package::new("d", "1.2.0"),
        ]);

        let order = resolve(&root, &catalog).unwrap();
        assert_eq!(
            names(&order),
            vec!["d@1.2.0", "b@1.0.0", "c@1.0.0", "a@1.0.0"]
        );
    }

    #[test]
    fn test_order_is_dependency_first() {
        let root = Package::new("app", "1.0.0")
            .with_dependency("web", "*")
            .with_dependency("log", "*");
        let catalog = Catalog::new(vec![
            Package::new("web", "2.0.0").with_dependency("http", "~1.4.0"),
            Package::new("http", "1.4.7").with_dependency("log", "*"),
            Package::new("log", "0.4.0"),
        ]);

        let order = resolve(&root, &catalog).unwrap();
        let position = |name: &str| order.iter().position(|p| p.name == name).unwrap();

        for pkg in &order {
            for dep in pkg.dependencies.keys() {
                assert!(position(dep) < position(&pkg.name), "{} before {}", pkg.name, dep);
            }
        }
        assert_eq!(order.last().unwrap().name, "app");
    }

    #[test]
    fn test_cycle_is_detected() {
        let root = Package::new("a", "1.0.0").with_dependency("b", "*");
        let catalog = Catalog::new(vec![
            Package::new("a", "1.0.0").with_dependency("b", "*"),
            Package::new("b", "1.0.0").with_dependency("a", "*"),
        ]);

        let result = resolve(&root, &catalog);
        assert!(matches!(
            result,
            Err(Error::CircularDependency(path)) if path == "a@1.0.0 -> b@1.0.0 -> a@1.0.0"
        ));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let root = Package::new("loop", "1.0.0").with_dependency("loop", "=1.0.0");
        let catalog = Catalog::new(vec![root.clone()]);

        assert!(matches!(
            resolve(&root, &catalog),
            Err(Error::CircularDependency(path)) if path == "loop@1.0.0 -> loop@1.0.0"
        ));
    }

    #[test]
    fn test_unsatisfiable_constraint_propagates() {
        let root = Package::new("a", "1.0.0").with_dependency("b", "^2.0.0");
        let catalog = Catalog::new(vec![Package::new("b", "1.9.0")]);

        match resolve(&root, &catalog) {
            Err(Error::NoSatisfyingVersion { name, constraint }) => {
                assert_eq!(name, "b");
                assert_eq!(constraint, "^2.0.0");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_closure_source() {
        let root = Package::new("a", "1.0.0").with_dependency("b", "*");
        let fetch =
            |name: &str, _constraint: &str| -> Result<Package> { Ok(Package::new(name, "3.1.4")) };

        let order = resolve(&root, &fetch).unwrap();
        assert_eq!(names(&order), vec!["b@3.1.4", "a@1.0.0"]);
    }
}
