//! Repository abstraction: a closed set of package-source kinds behind one
//! capability surface.
//!
//! The kinds are a tagged enum rather than a trait-object hierarchy; the
//! set is fixed at pool-construction time and dispatch is a `match`.

use std::sync::Arc;

use pyrite_core::constraint::Constraint;
use pyrite_core::dependency::canonicalize_name;
use pyrite_core::package::Package;
use pyrite_core::version::Version;
use pyrite_util::errors::{PyriteError, PyriteResult};

use crate::pypi::PypiRepository;

/// A package source. `find_packages` lists candidate versions newest
/// first; `get_package` builds full metadata for one exact version.
#[derive(Debug)]
pub enum Repository {
    /// A JSON-API package index with artifact-inspection fallback.
    Pypi(PypiRepository),
    /// A fixed in-memory set: test fixtures, locked or installed snapshots.
    Memory(MemoryRepository),
}

impl Repository {
    pub fn name(&self) -> &str {
        match self {
            Repository::Pypi(repo) => repo.name(),
            Repository::Memory(repo) => repo.name(),
        }
    }

    /// Every available version of `name` satisfying `constraint`, newest
    /// first. Pre-releases are excluded unless the constraint itself
    /// references a pre-release.
    pub async fn find_packages(
        &self,
        name: &str,
        constraint: &Constraint,
    ) -> PyriteResult<Vec<Arc<Package>>> {
        match self {
            Repository::Pypi(repo) => repo.find_packages(name, constraint).await,
            Repository::Memory(repo) => Ok(repo.find_packages(name, constraint)),
        }
    }

    /// Full metadata for one exact version.
    pub async fn get_package(&self, name: &str, version: &Version) -> PyriteResult<Arc<Package>> {
        match self {
            Repository::Pypi(repo) => repo.get_package(name, version).await,
            Repository::Memory(repo) => repo.get_package(name, version),
        }
    }
}

/// An in-memory repository over a fixed package set.
///
/// Backs fixture repositories in tests and the locked/installed snapshots
/// the solver consults for pin preferences.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    name: String,
    packages: Vec<Arc<Package>>,
}

impl MemoryRepository {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            packages: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_package(&mut self, package: Package) {
        self.packages.push(Arc::new(package));
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn packages(&self) -> impl Iterator<Item = &Arc<Package>> {
        self.packages.iter()
    }

    /// All stored versions of `name`, newest first.
    pub fn packages_named(&self, name: &str) -> Vec<Arc<Package>> {
        let canonical = canonicalize_name(name);
        let mut out: Vec<Arc<Package>> = self
            .packages
            .iter()
            .filter(|p| p.name() == canonical)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.version().cmp(a.version()));
        out
    }

    pub fn find_packages(&self, name: &str, constraint: &Constraint) -> Vec<Arc<Package>> {
        let allow_prereleases = constraint.references_prerelease();
        self.packages_named(name)
            .into_iter()
            .filter(|p| constraint.allows(p.version()))
            .filter(|p| allow_prereleases || !p.version().is_prerelease())
            .collect()
    }

    pub fn get_package(&self, name: &str, version: &Version) -> PyriteResult<Arc<Package>> {
        let canonical = canonicalize_name(name);
        self.packages
            .iter()
            .find(|p| p.name() == canonical && p.version() == version)
            .cloned()
            .ok_or_else(|| PyriteError::not_found_at(canonical, version))
    }
}
