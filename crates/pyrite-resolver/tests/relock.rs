//! Full-stack re-lock flow: resolve, write a lockfile, resolve again with
//! the lock as a pin source, and verify nothing churns.

use pyrite_core::dependency::Dependency;
use pyrite_core::environment::Environment;
use pyrite_core::lockfile::Lockfile;
use pyrite_core::package::Package;
use pyrite_core::version::Version;
use pyrite_index::pool::{Priority, RepositoryPool};
use pyrite_index::repository::{MemoryRepository, Repository};
use pyrite_resolver::Resolver;

fn pkg(name: &str, version: &str, requires: &[&str]) -> Package {
    let mut package = Package::new(name, Version::parse(version).unwrap());
    for req in requires {
        package.requires.push(Dependency::parse(req).unwrap());
    }
    package
}

fn pool_with(packages: Vec<Package>) -> RepositoryPool {
    let mut repo = MemoryRepository::new("fixture");
    for package in packages {
        repo.add_package(package);
    }
    let mut pool = RepositoryPool::new();
    pool.add_repository(Repository::Memory(repo), Priority::Default, false)
        .unwrap();
    pool
}

fn root() -> Package {
    pkg("myapp", "0.1.0", &["requests (^2.18)"])
}

fn ecosystem(extra_requests: &[&str]) -> Vec<Package> {
    let mut packages = vec![
        pkg("requests", "2.18.4", &["idna (>=2.5,<2.8)"]),
        pkg("idna", "2.6", &[]),
        pkg("idna", "2.7", &[]),
    ];
    for version in extra_requests {
        packages.push(pkg("requests", version, &["idna (>=2.5,<2.8)"]));
    }
    packages
}

#[tokio::test]
async fn relock_without_changes_is_stable() {
    let pool = pool_with(ecosystem(&[]));
    let env = Environment::linux_cpython((3, 7, 2));

    let resolver = Resolver::new(&pool, env.clone());
    let ops = resolver.resolve(&root(), &[], false).await.unwrap();
    let resolved: Vec<Package> = ops.iter().map(|op| (**op.package()).clone()).collect();
    let lockfile = Lockfile::from_packages(resolved.iter(), "requests = \"^2.18\"");

    // Reconstruct the lock repository the way a manifest-driven caller
    // would, then re-resolve with it.
    let mut locked = MemoryRepository::new("locked");
    for package in lockfile.to_packages().unwrap() {
        locked.add_package(package);
    }

    let resolver = Resolver::new(&pool, env).with_locked(&locked);
    let again = resolver.resolve(&root(), &[], false).await.unwrap();

    let versions = |ops: &[pyrite_resolver::Operation]| -> Vec<String> {
        ops.iter()
            .map(|op| format!("{} {}", op.package().name(), op.package().version()))
            .collect()
    };
    assert_eq!(versions(&ops), versions(&again));
}

#[tokio::test]
async fn relock_keeps_pinned_version_when_newer_appears() {
    // First resolution sees only 2.18.4 and locks it.
    let pool = pool_with(ecosystem(&[]));
    let env = Environment::linux_cpython((3, 7, 2));
    let resolver = Resolver::new(&pool, env.clone());
    let ops = resolver.resolve(&root(), &[], false).await.unwrap();
    let resolved: Vec<Package> = ops.iter().map(|op| (**op.package()).clone()).collect();
    let lockfile = Lockfile::from_packages(resolved.iter(), "requests = \"^2.18\"");

    // The index later gains 2.20.0; the lock still satisfies ^2.18 and
    // must win over the newer version.
    let pool = pool_with(ecosystem(&["2.20.0"]));
    let mut locked = MemoryRepository::new("locked");
    for package in lockfile.to_packages().unwrap() {
        locked.add_package(package);
    }
    let resolver = Resolver::new(&pool, env).with_locked(&locked);
    let again = resolver.resolve(&root(), &[], false).await.unwrap();

    let requests = again
        .iter()
        .find(|op| op.package().name() == "requests")
        .unwrap();
    assert_eq!(requests.package().version().to_string(), "2.18.4");
}
