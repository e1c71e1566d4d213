//! Deterministic lockfile recording exact resolved package versions.

use serde::{Deserialize, Serialize};
use std::path::Path;

use pyrite_util::errors::{PyriteError, PyriteResult};
use pyrite_util::hash::sha256_bytes;

use crate::constraint::Constraint;
use crate::marker::Marker;
use crate::package::{Package, PackageFile};
use crate::version::Version;

/// Lockfile contents: resolution metadata plus one entry per resolved
/// package, sorted by name for stable diffs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lockfile {
    pub metadata: LockMetadata,
    #[serde(default)]
    pub package: Vec<LockedPackage>,
}

/// Hash of the root requirements the lock was computed from, used to
/// detect staleness without re-resolving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockMetadata {
    pub content_hash: String,
}

/// A single locked package with its resolved version and file digests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockedPackage {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub marker: Option<String>,
    #[serde(default)]
    pub files: Vec<LockedFile>,
    #[serde(default)]
    pub dependencies: Vec<LockedDependencyRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockedFile {
    pub file: String,
    #[serde(default)]
    pub hash: Option<String>,
}

/// A reference to a dependency within the lockfile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockedDependencyRef {
    pub name: String,
    pub constraint: String,
}

impl Lockfile {
    /// Build a lockfile from a resolved package set and the requirement
    /// text the resolution was computed from.
    pub fn from_packages<'a>(
        packages: impl IntoIterator<Item = &'a Package>,
        requirement_text: &str,
    ) -> Self {
        let mut entries: Vec<LockedPackage> = packages
            .into_iter()
            .map(|p| LockedPackage {
                name: p.name().to_string(),
                version: p.version().to_string(),
                source: p.source_url().map(str::to_string),
                marker: (!p.marker.is_any()).then(|| p.marker.to_string()),
                files: p
                    .files
                    .iter()
                    .map(|f| LockedFile {
                        file: f.file.clone(),
                        hash: f.hash.clone(),
                    })
                    .collect(),
                dependencies: p
                    .requires
                    .iter()
                    .map(|d| LockedDependencyRef {
                        name: d.name.clone(),
                        constraint: d.constraint.to_string(),
                    })
                    .collect(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            metadata: LockMetadata {
                content_hash: sha256_bytes(requirement_text.as_bytes()),
            },
            package: entries,
        }
    }

    /// Load and parse a lockfile from the given path.
    pub fn from_path(path: &Path) -> PyriteResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse lockfile TOML.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> PyriteResult<Self> {
        toml::from_str(content).map_err(|e| PyriteError::Generic {
            message: format!("Failed to parse lockfile: {e}"),
        })
    }

    /// Serialize to pretty-printed TOML.
    pub fn to_string_pretty(&self) -> PyriteResult<String> {
        toml::to_string_pretty(self).map_err(|e| PyriteError::Generic {
            message: format!("Failed to serialize lockfile: {e}"),
        })
    }

    /// Whether the lock was computed from the given requirement text.
    pub fn is_fresh(&self, requirement_text: &str) -> bool {
        self.metadata.content_hash == sha256_bytes(requirement_text.as_bytes())
    }

    /// Reconstruct the locked packages, e.g. to seed an in-memory
    /// repository the solver consults for pin preferences.
    pub fn to_packages(&self) -> PyriteResult<Vec<Package>> {
        let mut out = Vec::with_capacity(self.package.len());
        for locked in &self.package {
            let version = Version::parse(&locked.version)?;
            let mut package = Package::new(&locked.name, version);
            package.source_url = locked.source.clone();
            if let Some(marker) = &locked.marker {
                package.marker = Marker::parse(marker)?;
            }
            package.files = locked
                .files
                .iter()
                .map(|f| PackageFile {
                    file: f.file.clone(),
                    hash: f.hash.clone(),
                })
                .collect();
            for dep in &locked.dependencies {
                package.requires.push(crate::dependency::Dependency::new(
                    &dep.name,
                    Constraint::parse(&dep.constraint)?,
                ));
            }
            out.push(package);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::Dependency;

    fn sample_package() -> Package {
        let mut package = Package::new("requests", Version::parse("2.18.4").unwrap());
        package.source_url = Some("https://pypi.org/simple/requests".to_string());
        package.files.push(PackageFile {
            file: "requests-2.18.4-py2.py3-none-any.whl".to_string(),
            hash: Some("sha256:abc123".to_string()),
        });
        package
            .requires
            .push(Dependency::parse("idna (>=2.5,<2.7)").unwrap());
        package
    }

    #[test]
    fn round_trip() {
        let lockfile = Lockfile::from_packages([&sample_package()], "requests = \"^2.18\"");
        let toml_text = lockfile.to_string_pretty().unwrap();
        let parsed = Lockfile::from_str(&toml_text).unwrap();

        assert_eq!(parsed.package.len(), 1);
        assert_eq!(parsed.package[0].name, "requests");
        assert_eq!(parsed.package[0].version, "2.18.4");
        assert_eq!(parsed.package[0].dependencies[0].name, "idna");
        assert_eq!(parsed.metadata.content_hash, lockfile.metadata.content_hash);
    }

    #[test]
    fn freshness_tracks_requirement_text() {
        let lockfile = Lockfile::from_packages([&sample_package()], "requests = \"^2.18\"");
        assert!(lockfile.is_fresh("requests = \"^2.18\""));
        assert!(!lockfile.is_fresh("requests = \"^2.19\""));
    }

    #[test]
    fn entries_sorted_by_name() {
        let b = sample_package();
        let a = Package::new("attrs", Version::parse("19.1.0").unwrap());
        let lockfile = Lockfile::from_packages([&b, &a], "x");
        assert_eq!(lockfile.package[0].name, "attrs");
        assert_eq!(lockfile.package[1].name, "requests");
    }

    #[test]
    fn to_packages_reconstructs() {
        let lockfile = Lockfile::from_packages([&sample_package()], "x");
        let packages = lockfile.to_packages().unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name(), "requests");
        assert_eq!(packages[0].version(), &Version::parse("2.18.4").unwrap());
        assert_eq!(packages[0].requires.len(), 1);
    }
}
