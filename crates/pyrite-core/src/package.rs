//! Candidate and resolved package metadata.

use std::collections::BTreeMap;
use std::fmt;

use crate::constraint::Constraint;
use crate::dependency::{canonicalize_name, Dependency};
use crate::marker::Marker;
use crate::version::Version;

/// Canonical name + exact version. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageId {
    pub name: String,
    pub version: Version,
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// One distributable file of a package version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    pub file: String,
    /// `sha256:…` or `md5:…` digest as published by the index.
    pub hash: Option<String>,
}

/// A candidate or resolved package.
///
/// Constructed by a repository from fetched or inferred metadata and not
/// mutated afterwards; repositories hand out `Arc<Package>`.
#[derive(Debug, Clone)]
pub struct Package {
    name: String,
    pretty_name: String,
    version: Version,
    /// Base dependencies, in declaration order.
    pub requires: Vec<Dependency>,
    /// Development-only requirements of the root package.
    pub dev_requires: Vec<Dependency>,
    /// Extra name → dependencies activated by that extra.
    pub extras: BTreeMap<String, Vec<Dependency>>,
    /// Distribution files published for this version.
    pub files: Vec<PackageFile>,
    /// Where the package came from (index URL, artifact URL).
    pub source_url: Option<String>,
    /// Restriction on when this package applies at all (e.g. a
    /// platform-specific transitive dependency).
    pub marker: Marker,
    /// Supported interpreter versions (`requires-python`).
    pub python_constraint: Constraint,
}

impl Package {
    pub fn new(name: &str, version: Version) -> Self {
        Self {
            name: canonicalize_name(name),
            pretty_name: name.to_string(),
            version,
            requires: Vec::new(),
            dev_requires: Vec::new(),
            extras: BTreeMap::new(),
            files: Vec::new(),
            source_url: None,
            marker: Marker::Any,
            python_constraint: Constraint::Any,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pretty_name(&self) -> &str {
        &self.pretty_name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn id(&self) -> PackageId {
        PackageId {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    /// Base dependencies plus those gated by the named extras. Unknown
    /// extra names contribute nothing.
    pub fn requires_with_extras(&self, extras: &[String]) -> Vec<Dependency> {
        let mut out = self.requires.clone();
        for extra in extras {
            if let Some(deps) = self.extras.get(&canonicalize_name(extra)) {
                out.extend(deps.iter().cloned());
            }
        }
        out
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version
    }
}

impl Eq for Package {}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}
