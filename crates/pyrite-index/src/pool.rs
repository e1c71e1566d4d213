//! The repository pool: an ordered collection of package sources with
//! priority classes, mediating lookup fallback.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use pyrite_core::constraint::Constraint;
use pyrite_core::package::Package;
use pyrite_core::version::Version;
use pyrite_util::errors::{PyriteError, PyriteResult};

use crate::repository::Repository;

/// Repository rank governing lookup order. Exactly one repository may hold
/// `Default` at a time.
///
/// The wire tokens `default`/`primary`/`secondary`/`explicit` map 1:1 to
/// these values: case-insensitive on read, lower-case canonical on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Default,
    Primary,
    Secondary,
    Explicit,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Default => "default",
            Priority::Primary => "primary",
            Priority::Secondary => "secondary",
            Priority::Explicit => "explicit",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = PyriteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Priority::Default),
            "primary" => Ok(Priority::Primary),
            "secondary" => Ok(Priority::Secondary),
            "explicit" => Ok(Priority::Explicit),
            other => Err(PyriteError::Config {
                message: format!("unknown repository priority `{other}`"),
            }),
        }
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Priority::from_str(&text).map_err(|e| D::Error::custom(e.to_string()))
    }
}

/// One pool member.
#[derive(Debug)]
pub struct PoolEntry {
    pub repository: Repository,
    pub priority: Priority,
    /// Transport failures on an optional repository are skipped instead of
    /// aborting the lookup.
    pub optional: bool,
}

/// An ordered collection of repositories. Sources and priorities are fixed
/// before resolution starts; lookups are read-only.
#[derive(Debug, Default)]
pub struct RepositoryPool {
    entries: Vec<PoolEntry>,
}

impl RepositoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a repository. At most one `Default`-priority repository is
    /// permitted; violating that is a configuration error.
    pub fn add_repository(
        &mut self,
        repository: Repository,
        priority: Priority,
        optional: bool,
    ) -> PyriteResult<&mut Self> {
        if priority == Priority::Default
            && self.entries.iter().any(|e| e.priority == Priority::Default)
        {
            return Err(PyriteError::Config {
                message: "only one repository may hold the default priority".to_string(),
            });
        }
        self.entries.push(PoolEntry {
            repository,
            priority,
            optional,
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The default repository, if one was configured.
    pub fn default_repository(&self) -> Option<&Repository> {
        self.entries
            .iter()
            .find(|e| e.priority == Priority::Default)
            .map(|e| &e.repository)
    }

    /// Look up a repository by name.
    pub fn repository(&self, name: &str) -> PyriteResult<&Repository> {
        self.entries
            .iter()
            .map(|e| &e.repository)
            .find(|r| r.name() == name)
            .ok_or_else(|| PyriteError::Config {
                message: format!("no repository named `{name}` in the pool"),
            })
    }

    /// Entries in descending priority order, insertion order within a
    /// priority class.
    pub fn prioritized(&self) -> Vec<&PoolEntry> {
        let mut out: Vec<&PoolEntry> = self.entries.iter().collect();
        out.sort_by_key(|e| e.priority);
        out
    }

    /// Fetch one exact package, trying sources by descending priority.
    ///
    /// `PackageNotFound` advances to the next source. A transport failure
    /// on a non-optional source propagates immediately — no silent
    /// fallback past a hard network failure; on an optional source it is
    /// swallowed and the next source tried.
    pub async fn package(&self, name: &str, version: &Version) -> PyriteResult<Arc<Package>> {
        for entry in self.prioritized() {
            match entry.repository.get_package(name, version).await {
                Ok(package) => return Ok(package),
                Err(PyriteError::PackageNotFound { .. }) => continue,
                Err(err @ PyriteError::Network { .. }) => {
                    if entry.optional {
                        tracing::warn!(
                            repository = entry.repository.name(),
                            error = %err,
                            "skipping unreachable optional repository"
                        );
                        continue;
                    }
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(PyriteError::not_found_at(name, version))
    }

    /// Find candidate versions. The first source with any matching version
    /// wins entirely; candidate lists are never merged across sources — a
    /// registry owns its package.
    pub async fn find_packages(
        &self,
        name: &str,
        constraint: &Constraint,
    ) -> PyriteResult<Vec<Arc<Package>>> {
        for entry in self.prioritized() {
            match entry.repository.find_packages(name, constraint).await {
                Ok(packages) if !packages.is_empty() => return Ok(packages),
                Ok(_) => continue,
                Err(err @ PyriteError::Network { .. }) if entry.optional => {
                    tracing::warn!(
                        repository = entry.repository.name(),
                        error = %err,
                        "skipping unreachable optional repository"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use pyrite_core::environment::Environment;

    fn memory_repo(name: &str, packages: &[(&str, &str)]) -> Repository {
        let mut repo = MemoryRepository::new(name);
        for (pkg, version) in packages {
            repo.add_package(Package::new(pkg, Version::parse(version).unwrap()));
        }
        Repository::Memory(repo)
    }

    /// A repository whose transport always fails with a connection error.
    fn unreachable_repo(name: &str) -> Repository {
        Repository::Pypi(
            crate::pypi::PypiRepository::with_timeout(
                name,
                "http://127.0.0.1:1",
                Environment::linux_cpython((3, 7, 2)),
                std::time::Duration::from_millis(250),
            )
            .unwrap(),
        )
    }

    #[test]
    fn priority_wire_tokens() {
        assert_eq!(Priority::Default.to_string(), "default");
        assert_eq!("EXPLICIT".parse::<Priority>().unwrap(), Priority::Explicit);
        assert_eq!("Primary".parse::<Priority>().unwrap(), Priority::Primary);
        assert!("tertiary".parse::<Priority>().is_err());

        let json = serde_json::to_string(&Priority::Secondary).unwrap();
        assert_eq!(json, "\"secondary\"");
        let parsed: Priority = serde_json::from_str("\"DEFAULT\"").unwrap();
        assert_eq!(parsed, Priority::Default);
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::Default < Priority::Primary);
        assert!(Priority::Primary < Priority::Secondary);
        assert!(Priority::Secondary < Priority::Explicit);
    }

    #[test]
    fn single_default_enforced() {
        let mut pool = RepositoryPool::new();
        pool.add_repository(memory_repo("a", &[]), Priority::Default, false)
            .unwrap();
        let err = pool
            .add_repository(memory_repo("b", &[]), Priority::Default, false)
            .unwrap_err();
        assert!(matches!(err, PyriteError::Config { .. }));
    }

    #[test]
    fn repository_lookup_by_name() {
        let mut pool = RepositoryPool::new();
        pool.add_repository(memory_repo("internal", &[]), Priority::Primary, false)
            .unwrap();
        assert_eq!(pool.repository("internal").unwrap().name(), "internal");
        assert!(matches!(
            pool.repository("missing").unwrap_err(),
            PyriteError::Config { .. }
        ));
    }

    #[test]
    fn prioritized_order_is_priority_then_insertion() {
        let mut pool = RepositoryPool::new();
        pool.add_repository(memory_repo("second", &[]), Priority::Secondary, false)
            .unwrap();
        pool.add_repository(memory_repo("main", &[]), Priority::Default, false)
            .unwrap();
        pool.add_repository(memory_repo("first", &[]), Priority::Primary, false)
            .unwrap();

        let names: Vec<&str> = pool
            .prioritized()
            .iter()
            .map(|e| e.repository.name())
            .collect();
        assert_eq!(names, vec!["main", "first", "second"]);
    }

    #[tokio::test]
    async fn package_not_found_when_all_exhausted() {
        let mut pool = RepositoryPool::new();
        pool.add_repository(memory_repo("empty", &[]), Priority::Default, false)
            .unwrap();

        let err = pool
            .package("foo", &Version::parse("1.0.0").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, PyriteError::PackageNotFound { .. }));
    }

    #[tokio::test]
    async fn optional_unreachable_repo_yields_not_found() {
        let mut pool = RepositoryPool::new();
        pool.add_repository(unreachable_repo("offline"), Priority::Primary, true)
            .unwrap();

        let err = pool
            .package("foo", &Version::parse("1.0.0").unwrap())
            .await
            .unwrap_err();
        assert!(
            matches!(err, PyriteError::PackageNotFound { .. }),
            "expected PackageNotFound, got {err}"
        );
    }

    #[tokio::test]
    async fn non_optional_unreachable_repo_fails_fast() {
        let mut pool = RepositoryPool::new();
        pool.add_repository(unreachable_repo("offline"), Priority::Primary, false)
            .unwrap();
        // A later repository that would have succeeded must not be reached.
        pool.add_repository(
            memory_repo("working", &[("foo", "1.0.0")]),
            Priority::Secondary,
            false,
        )
        .unwrap();

        let err = pool
            .package("foo", &Version::parse("1.0.0").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, PyriteError::Network { .. }));
    }

    #[tokio::test]
    async fn fallback_past_optional_failure() {
        let mut pool = RepositoryPool::new();
        pool.add_repository(unreachable_repo("offline"), Priority::Primary, true)
            .unwrap();
        pool.add_repository(
            memory_repo("working", &[("requests", "2.18.4")]),
            Priority::Secondary,
            false,
        )
        .unwrap();

        let package = pool
            .package("requests", &Version::parse("2.18.4").unwrap())
            .await
            .unwrap();
        assert_eq!(package.name(), "requests");
    }

    #[tokio::test]
    async fn find_packages_first_nonempty_source_wins() {
        let mut pool = RepositoryPool::new();
        pool.add_repository(
            memory_repo("primary", &[("requests", "2.18.0")]),
            Priority::Primary,
            false,
        )
        .unwrap();
        pool.add_repository(
            memory_repo("secondary", &[("requests", "2.20.0")]),
            Priority::Secondary,
            false,
        )
        .unwrap();

        let found = pool
            .find_packages("requests", &Constraint::parse(">=2.0").unwrap())
            .await
            .unwrap();
        // No cross-source merging: the primary's single version wins.
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].version().to_string(), "2.18.0");
    }

    #[tokio::test]
    async fn find_packages_advances_past_empty_source() {
        let mut pool = RepositoryPool::new();
        pool.add_repository(memory_repo("empty", &[]), Priority::Primary, false)
            .unwrap();
        pool.add_repository(
            memory_repo("stocked", &[("requests", "2.20.0")]),
            Priority::Secondary,
            false,
        )
        .unwrap();

        let found = pool
            .find_packages("requests", &Constraint::parse(">=2.0").unwrap())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].version().to_string(), "2.20.0");
    }
}
