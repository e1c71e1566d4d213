//! Dependency declarations: a package name, a version constraint, an
//! environment marker, and an optional direct source reference.

use std::fmt;
use std::path::PathBuf;

use pyrite_util::errors::{PyriteError, PyriteResult};

use crate::constraint::Constraint;
use crate::marker::Marker;
use crate::package::Package;

/// Normalize a package name: lowercase, with runs of `-`, `_`, and `.`
/// collapsed to a single `-`. `My_Package.Name` and `my-package-name` are
/// the same package.
pub fn canonicalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for ch in name.trim().chars() {
        if ch == '-' || ch == '_' || ch == '.' {
            if !last_was_sep && !out.is_empty() {
                out.push('-');
            }
            last_was_sep = true;
        } else {
            out.extend(ch.to_lowercase());
            last_was_sep = false;
        }
    }
    if out.ends_with('-') {
        out.pop();
    }
    out
}

/// Where a dependency must be fetched from.
///
/// Anything other than `Registry` is a direct reference: it pins a single
/// resolved artifact and bypasses version-constraint matching entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySource {
    /// Resolved against the repository pool.
    Registry,
    /// A direct artifact URL.
    Url { url: String },
    /// A git repository, optionally pinned to a branch/tag/revision.
    Git {
        url: String,
        reference: Option<String>,
    },
    /// A local archive file.
    Path { path: PathBuf },
    /// A local source directory.
    Directory { path: PathBuf },
}

/// A single dependency edge: who is required, under which versions, and
/// when the edge applies.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    /// Canonical (normalized) name.
    pub name: String,
    /// The name as written by the declaring package.
    pub pretty_name: String,
    pub constraint: Constraint,
    pub marker: Marker,
    /// Extras of the *target* package this edge activates.
    pub extras: Vec<String>,
    pub source: DependencySource,
    /// Interpreter constraint implied by the marker's `python_version`
    /// clauses, used to reject interpreter-incompatible candidates early.
    pub python_constraint: Constraint,
}

impl Dependency {
    pub fn new(name: &str, constraint: Constraint) -> Self {
        Self {
            name: canonicalize_name(name),
            pretty_name: name.to_string(),
            constraint,
            marker: Marker::Any,
            extras: Vec::new(),
            source: DependencySource::Registry,
            python_constraint: Constraint::Any,
        }
    }

    /// Build a dependency from a requirement line as found in wheel
    /// `METADATA` and index JSON:
    /// `name[extra1,extra2] (>=1.0,<2.0) ; python_version >= "3.6"`,
    /// bare constraints without parentheses, or `name @ https://…` direct
    /// references.
    pub fn parse(text: &str) -> PyriteResult<Self> {
        let (spec, marker_text) = match text.split_once(';') {
            Some((spec, marker)) => (spec.trim(), Some(marker.trim())),
            None => (text.trim(), None),
        };
        if spec.is_empty() {
            return Err(PyriteError::parse("empty requirement", text));
        }

        let marker = match marker_text {
            Some(m) if !m.is_empty() => Marker::parse(m)?,
            Some(_) => return Err(PyriteError::parse("empty marker after `;`", text)),
            None => Marker::Any,
        };

        // Direct URL reference: `name @ url`.
        if let Some((name_part, url)) = spec.split_once('@') {
            let name_part = name_part.trim();
            let url = url.trim();
            if url.is_empty() {
                return Err(PyriteError::parse("empty URL after `@`", text));
            }
            let (name, extras) = split_name_extras(name_part, text)?;
            let mut dep = Dependency::new(&name, Constraint::Any);
            dep.extras = extras;
            dep.source = if url.starts_with("git+") {
                let stripped = url.trim_start_matches("git+");
                let (repo, reference) = match stripped.rsplit_once('#') {
                    Some((repo, frag)) => (repo, Some(frag.to_string())),
                    None => (stripped, None),
                };
                DependencySource::Git {
                    url: repo.to_string(),
                    reference,
                }
            } else {
                DependencySource::Url {
                    url: url.to_string(),
                }
            };
            dep.marker = marker;
            dep.python_constraint = dep.marker.python_constraint();
            return Ok(dep);
        }

        // `name[extras] (constraint)` or `name[extras] constraint`.
        let name_end = spec
            .find(|c: char| !(c.is_ascii_alphanumeric() || "-_.".contains(c)))
            .unwrap_or(spec.len());
        let (raw_name, mut rest) = spec.split_at(name_end);
        if raw_name.is_empty() {
            return Err(PyriteError::parse("requirement has no package name", text));
        }
        rest = rest.trim();

        let mut extras = Vec::new();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| {
                PyriteError::parse("unclosed extras bracket", text)
            })?;
            extras = after[..close]
                .split(',')
                .map(|e| canonicalize_name(e.trim()))
                .filter(|e| !e.is_empty())
                .collect();
            rest = after[close + 1..].trim();
        }

        let constraint_text = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .unwrap_or(rest)
            .trim();
        let constraint = if constraint_text.is_empty() {
            Constraint::Any
        } else {
            Constraint::parse(constraint_text)?
        };

        let mut dep = Dependency::new(raw_name, constraint);
        dep.extras = extras;
        dep.marker = marker;
        dep.python_constraint = dep.marker.python_constraint();
        Ok(dep)
    }

    /// Whether this dependency pins a single artifact rather than a
    /// version range.
    pub fn is_direct_reference(&self) -> bool {
        !matches!(self.source, DependencySource::Registry)
    }

    /// Whether a candidate package satisfies this dependency.
    ///
    /// Direct references match on source identity; registry dependencies on
    /// the version constraint.
    pub fn allows(&self, package: &Package) -> bool {
        if self.name != package.name() {
            return false;
        }
        if self.is_direct_reference() {
            return match (&self.source, package.source_url()) {
                (DependencySource::Url { url }, Some(pkg_url)) => url == pkg_url,
                (DependencySource::Git { url, .. }, Some(pkg_url)) => pkg_url.starts_with(url),
                (
                    DependencySource::Path { path } | DependencySource::Directory { path },
                    Some(pkg_url),
                ) => {
                    let pkg_path = pkg_url.strip_prefix("file://").unwrap_or(pkg_url);
                    std::path::Path::new(pkg_path) == path
                }
                _ => false,
            };
        }
        self.constraint.allows(package.version())
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.constraint)
    }
}

fn split_name_extras(part: &str, whole: &str) -> PyriteResult<(String, Vec<String>)> {
    match part.split_once('[') {
        Some((name, rest)) => {
            let inner = rest.strip_suffix(']').ok_or_else(|| {
                PyriteError::parse("unclosed extras bracket", whole)
            })?;
            let extras = inner
                .split(',')
                .map(|e| canonicalize_name(e.trim()))
                .filter(|e| !e.is_empty())
                .collect();
            Ok((name.trim().to_string(), extras))
        }
        None => Ok((part.to_string(), Vec::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    #[test]
    fn canonical_names() {
        assert_eq!(canonicalize_name("Twisted"), "twisted");
        assert_eq!(canonicalize_name("zope.interface"), "zope-interface");
        assert_eq!(canonicalize_name("win_inet_pton"), "win-inet-pton");
        assert_eq!(canonicalize_name("My__Odd..Name"), "my-odd-name");
        assert_eq!(canonicalize_name("requests"), "requests");
    }

    #[test]
    fn parse_bare_name() {
        let dep = Dependency::parse("requests").unwrap();
        assert_eq!(dep.name, "requests");
        assert!(dep.constraint.is_any());
        assert!(dep.marker.is_any());
    }

    #[test]
    fn parse_parenthesized_constraint() {
        let dep = Dependency::parse("chardet (>=3.0.2,<3.1.0)").unwrap();
        assert_eq!(dep.name, "chardet");
        assert!(dep.constraint.allows(&Version::parse("3.0.4").unwrap()));
        assert!(!dep.constraint.allows(&Version::parse("3.1.0").unwrap()));
    }

    #[test]
    fn parse_bare_constraint() {
        let dep = Dependency::parse("idna >=2.5,<2.8").unwrap();
        assert!(dep.constraint.allows(&Version::parse("2.7").unwrap()));
        let dep = Dependency::parse("attrs>=17.4.0").unwrap();
        assert_eq!(dep.name, "attrs");
    }

    #[test]
    fn parse_extras() {
        let dep = Dependency::parse("requests[security,socks] (>=2.18)").unwrap();
        assert_eq!(dep.extras, vec!["security", "socks"]);
    }

    #[test]
    fn parse_marker() {
        let dep =
            Dependency::parse("win-inet-pton ; sys_platform == \"win32\" and extra == \"socks\"")
                .unwrap();
        assert_eq!(dep.name, "win-inet-pton");
        assert!(!dep.marker.is_any());
        assert_eq!(dep.marker.gated_extras(), vec!["socks".to_string()]);
    }

    #[test]
    fn python_constraint_from_marker() {
        let dep = Dependency::parse(
            "futures ; python_version == \"2.7\" or python_version == \"2.6\"",
        )
        .unwrap();
        assert!(dep
            .python_constraint
            .allows(&Version::parse("2.7.5").unwrap()));
        assert!(!dep.python_constraint.allows(&Version::parse("3.6").unwrap()));
    }

    #[test]
    fn parse_direct_url() {
        let dep = Dependency::parse(
            "demo @ https://example.com/demo-0.1.0-py2.py3-none-any.whl",
        )
        .unwrap();
        assert!(dep.is_direct_reference());
        assert!(matches!(dep.source, DependencySource::Url { .. }));
        assert!(dep.constraint.is_any());
    }

    #[test]
    fn parse_git_reference() {
        let dep = Dependency::parse("demo @ git+https://github.com/demo/demo.git#main").unwrap();
        match dep.source {
            DependencySource::Git { ref url, ref reference } => {
                assert_eq!(url, "https://github.com/demo/demo.git");
                assert_eq!(reference.as_deref(), Some("main"));
            }
            ref other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(Dependency::parse("").is_err());
        assert!(Dependency::parse("requests[security (>=2.18)").is_err());
        assert!(Dependency::parse("requests (>=banana)").is_err());
        assert!(Dependency::parse("demo @ ").is_err());
        assert!(Dependency::parse("requests ; ").is_err());
    }

    #[test]
    fn path_reference_matches_on_source_identity() {
        let mut dep = Dependency::new("demo", Constraint::Any);
        dep.source = DependencySource::Directory {
            path: "/workspace/demo".into(),
        };
        assert!(dep.is_direct_reference());

        let mut local = Package::new("demo", Version::parse("0.1.0").unwrap());
        local.source_url = Some("file:///workspace/demo".to_string());
        assert!(dep.allows(&local));

        // A registry edition of the same name and any version is not the
        // pinned artifact.
        let registry = Package::new("demo", Version::parse("0.1.0").unwrap());
        assert!(!dep.allows(&registry));
    }

    #[test]
    fn allows_checks_name_and_constraint() {
        let dep = Dependency::parse("requests (^2.18)").unwrap();
        let good = Package::new("requests", Version::parse("2.19.1").unwrap());
        let wrong_version = Package::new("requests", Version::parse("3.0.0").unwrap());
        let wrong_name = Package::new("urllib3", Version::parse("2.19.1").unwrap());
        assert!(dep.allows(&good));
        assert!(!dep.allows(&wrong_version));
        assert!(!dep.allows(&wrong_name));
    }
}
