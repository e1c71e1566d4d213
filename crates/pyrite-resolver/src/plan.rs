//! Install operations: the solver's output.

use std::fmt;
use std::sync::Arc;

use pyrite_core::marker::Marker;
use pyrite_core::package::Package;

use pyrite_index::repository::MemoryRepository;

/// One unit of the resolved plan. The plan is returned by value; the
/// solver keeps no reference to it.
#[derive(Debug, Clone)]
pub enum Operation {
    Install {
        package: Arc<Package>,
        /// Effective install condition for this package.
        marker: Marker,
    },
    Update {
        from: Arc<Package>,
        to: Arc<Package>,
        marker: Marker,
    },
    Uninstall {
        package: Arc<Package>,
    },
}

impl Operation {
    /// The package this operation acts on (the target version for
    /// updates).
    pub fn package(&self) -> &Arc<Package> {
        match self {
            Operation::Install { package, .. } => package,
            Operation::Update { to, .. } => to,
            Operation::Uninstall { package } => package,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Install { .. } => "install",
            Operation::Update { .. } => "update",
            Operation::Uninstall { .. } => "uninstall",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Update { from, to, .. } => {
                write!(f, "update {} {} -> {}", to.name(), from.version(), to.version())
            }
            other => write!(f, "{} {}", other.verb(), other.package()),
        }
    }
}

/// Derive operations for resolved packages (already in dependency-first
/// order) against the installed snapshot.
///
/// Uninstalls of no-longer-required packages come first, name-ordered;
/// a package already installed at the resolved version needs no
/// operation.
pub fn diff_with_installed(
    resolved: &[(Arc<Package>, Marker)],
    installed: Option<&MemoryRepository>,
) -> Vec<Operation> {
    let mut ops: Vec<Operation> = Vec::new();

    if let Some(installed) = installed {
        let mut stale: Vec<&Arc<Package>> = installed
            .packages()
            .filter(|p| !resolved.iter().any(|(r, _)| r.name() == p.name()))
            .collect();
        stale.sort_by(|a, b| a.name().cmp(b.name()));
        ops.extend(stale.into_iter().map(|p| Operation::Uninstall {
            package: p.clone(),
        }));
    }

    for (package, marker) in resolved {
        let existing = installed.and_then(|repo| {
            repo.packages_named(package.name()).into_iter().next()
        });
        match existing {
            Some(current) if current.version() == package.version() => {}
            Some(current) => ops.push(Operation::Update {
                from: current,
                to: package.clone(),
                marker: marker.clone(),
            }),
            None => ops.push(Operation::Install {
                package: package.clone(),
                marker: marker.clone(),
            }),
        }
    }

    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrite_core::version::Version;

    fn package(name: &str, version: &str) -> Arc<Package> {
        Arc::new(Package::new(name, Version::parse(version).unwrap()))
    }

    fn resolved(entries: &[(&str, &str)]) -> Vec<(Arc<Package>, Marker)> {
        entries
            .iter()
            .map(|(name, version)| (package(name, version), Marker::Any))
            .collect()
    }

    #[test]
    fn fresh_environment_installs_everything() {
        let ops = diff_with_installed(&resolved(&[("idna", "2.6"), ("requests", "2.18.4")]), None);
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| op.verb() == "install"));
        assert_eq!(ops[0].package().name(), "idna");
    }

    #[test]
    fn unchanged_package_needs_no_operation() {
        let mut installed = MemoryRepository::new("installed");
        installed.add_package(Package::new("idna", Version::parse("2.6").unwrap()));

        let ops = diff_with_installed(
            &resolved(&[("idna", "2.6"), ("requests", "2.18.4")]),
            Some(&installed),
        );
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].package().name(), "requests");
    }

    #[test]
    fn changed_version_updates() {
        let mut installed = MemoryRepository::new("installed");
        installed.add_package(Package::new("requests", Version::parse("2.18.0").unwrap()));

        let ops = diff_with_installed(&resolved(&[("requests", "2.20.0")]), Some(&installed));
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            Operation::Update { from, to, .. } => {
                assert_eq!(from.version().to_string(), "2.18.0");
                assert_eq!(to.version().to_string(), "2.20.0");
            }
            other => panic!("expected update, got {other}"),
        }
    }

    #[test]
    fn stale_packages_uninstall_first_by_name() {
        let mut installed = MemoryRepository::new("installed");
        installed.add_package(Package::new("zombie", Version::parse("1.0").unwrap()));
        installed.add_package(Package::new("abandoned", Version::parse("1.0").unwrap()));

        let ops = diff_with_installed(&resolved(&[("requests", "2.20.0")]), Some(&installed));
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].verb(), "uninstall");
        assert_eq!(ops[0].package().name(), "abandoned");
        assert_eq!(ops[1].package().name(), "zombie");
        assert_eq!(ops[2].verb(), "install");
    }
}
