//! Requirement chains and unsatisfiable-constraint reporting.
//!
//! Every resolution failure names the chain of requirers that produced
//! it, not just the terminal package.

use std::fmt;

use pyrite_core::dependency::Dependency;
use pyrite_core::version::Version;
use pyrite_util::errors::PyriteError;

/// One step in a requirement chain: a resolved package declaring a
/// dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainLink {
    /// Display form of the requirer, e.g. `myapp 0.1.0`.
    pub requirer: String,
    /// Canonical name of the requirer.
    pub requirer_name: String,
    /// Canonical name of the required package.
    pub dep_name: String,
    /// Display form of the requirement, e.g. `lib (>=2.0)`.
    pub requirement: String,
}

impl ChainLink {
    pub fn new(requirer_pretty: &str, requirer_name: &str, dep: &Dependency) -> Self {
        Self {
            requirer: requirer_pretty.to_string(),
            requirer_name: requirer_name.to_string(),
            dep_name: dep.name.clone(),
            requirement: dep.to_string(),
        }
    }
}

/// An ordered sequence of package → requirement edges from the root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequirementChain {
    links: Vec<ChainLink>,
}

impl RequirementChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new chain with one more edge appended; the original is untouched
    /// (chains are shared across sibling edges).
    pub fn extended(&self, link: ChainLink) -> Self {
        let mut links = self.links.clone();
        links.push(link);
        Self { links }
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether a package participates in this chain, as requirer or as
    /// requirement target.
    pub fn mentions(&self, name: &str) -> bool {
        self.links
            .iter()
            .any(|l| l.requirer_name == name || l.dep_name == name)
    }

    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }
}

impl fmt::Display for RequirementChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, link) in self.links.iter().enumerate() {
            if i > 0 {
                f.write_str(", which ")?;
            }
            write!(f, "{} depends on {}", link.requirer, link.requirement)?;
        }
        Ok(())
    }
}

/// An unsatisfiable state discovered during search: a dependency edge
/// excludes the version some earlier chain pinned.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub name: String,
    pub dep: Dependency,
    /// The chain that just imposed the incompatible requirement.
    pub new_chain: RequirementChain,
    /// The chain through which the current version was assigned; empty
    /// when no candidate existed in the first place.
    pub existing_chain: RequirementChain,
    /// The version the conflicting edge rejected, if one was assigned.
    pub assigned: Option<Version>,
}

impl Conflict {
    /// Render the terminal resolution error, naming both requirer chains.
    pub fn into_error(self) -> PyriteError {
        PyriteError::Resolution {
            message: self.to_string(),
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.assigned {
            Some(version) => {
                write!(
                    f,
                    "no version of {} satisfies every requirement: {} is pinned to {version} because {}; but {}",
                    self.name, self.name, self.existing_chain, self.new_chain
                )
            }
            None => {
                write!(
                    f,
                    "no matching version found for {}: {}",
                    self.dep, self.new_chain
                )
            }
        }
    }
}
