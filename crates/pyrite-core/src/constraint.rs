//! Version constraint parsing and the constraint algebra.
//!
//! A [`Constraint`] is a pure predicate over [`Version`], closed under
//! intersection and union. Comma-joined parts intersect, pipe-joined parts
//! (`||` or `|`) union. Primitive operators: `=`/`==`, `!=`, `>`, `>=`, `<`,
//! `<=`, caret `^`, tilde `~`/`~=`, and wildcards (`*`, `1.2.*`).
//!
//! Intersecting disjoint ranges yields the explicit [`Constraint::Empty`]
//! sentinel rather than a range that silently rejects everything.

use std::fmt;

use pyrite_util::errors::{PyriteError, PyriteResult};

use crate::version::Version;

/// A predicate selecting acceptable versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Matches every version (`*`).
    Any,
    /// Matches no version. Produced when an intersection is unsatisfiable.
    Empty,
    /// A contiguous range, possibly unbounded on either side.
    Range(VersionRange),
    /// A union of ranges (`>=1.0,<2.0 || >=3.0`).
    Union(Vec<VersionRange>),
}

/// A contiguous version range with optional inclusive/exclusive bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub min: Option<Version>,
    pub max: Option<Version>,
    pub include_min: bool,
    pub include_max: bool,
}

impl VersionRange {
    pub fn exact(version: Version) -> Self {
        Self {
            min: Some(version.clone()),
            max: Some(version),
            include_min: true,
            include_max: true,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.include_min
            && self.include_max
            && matches!((&self.min, &self.max), (Some(a), Some(b)) if a == b)
    }

    /// Check whether a version falls inside this range.
    pub fn contains(&self, version: &Version) -> bool {
        if let Some(ref min) = self.min {
            if self.include_min {
                if version < min {
                    return false;
                }
            } else if version <= min {
                return false;
            }
        }
        if let Some(ref max) = self.max {
            if self.include_max {
                if version > max {
                    return false;
                }
            } else if version >= max {
                return false;
            }
        }
        true
    }

    /// Intersect two ranges. `None` means the intersection is empty.
    fn intersect(&self, other: &VersionRange) -> Option<VersionRange> {
        let (min, include_min) = match (&self.min, &other.min) {
            (None, None) => (None, false),
            (Some(a), None) => (Some(a.clone()), self.include_min),
            (None, Some(b)) => (Some(b.clone()), other.include_min),
            (Some(a), Some(b)) => {
                if a > b {
                    (Some(a.clone()), self.include_min)
                } else if b > a {
                    (Some(b.clone()), other.include_min)
                } else {
                    (Some(a.clone()), self.include_min && other.include_min)
                }
            }
        };
        let (max, include_max) = match (&self.max, &other.max) {
            (None, None) => (None, false),
            (Some(a), None) => (Some(a.clone()), self.include_max),
            (None, Some(b)) => (Some(b.clone()), other.include_max),
            (Some(a), Some(b)) => {
                if a < b {
                    (Some(a.clone()), self.include_max)
                } else if b < a {
                    (Some(b.clone()), other.include_max)
                } else {
                    (Some(a.clone()), self.include_max && other.include_max)
                }
            }
        };

        if let (Some(lo), Some(hi)) = (&min, &max) {
            if lo > hi {
                return None;
            }
            if lo == hi && !(include_min && include_max) {
                return None;
            }
        }

        Some(VersionRange {
            min,
            max,
            include_min,
            include_max,
        })
    }
}

impl Constraint {
    /// Parse a constraint expression.
    pub fn parse(text: &str) -> PyriteResult<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(PyriteError::parse("empty constraint", text));
        }

        let mut result: Option<Constraint> = None;
        for group in trimmed.replace("||", "|").split('|') {
            let group = group.trim();
            if group.is_empty() {
                return Err(PyriteError::parse("empty union member", text));
            }
            let mut intersected = Constraint::Any;
            for part in group.split(',') {
                let primitive = parse_primitive(part.trim(), text)?;
                intersected = intersected.intersect(&primitive);
            }
            result = Some(match result {
                Some(acc) => acc.union(&intersected),
                None => intersected,
            });
        }
        Ok(result.unwrap_or(Constraint::Any))
    }

    /// Whether `version` satisfies this constraint. Total and side-effect
    /// free.
    pub fn allows(&self, version: &Version) -> bool {
        match self {
            Constraint::Any => true,
            Constraint::Empty => false,
            Constraint::Range(range) => range.contains(version),
            Constraint::Union(ranges) => ranges.iter().any(|r| r.contains(version)),
        }
    }

    /// Intersect two constraints, short-circuiting to [`Constraint::Empty`]
    /// when the result is unsatisfiable.
    pub fn intersect(&self, other: &Constraint) -> Constraint {
        match (self, other) {
            (Constraint::Any, _) => other.clone(),
            (_, Constraint::Any) => self.clone(),
            (Constraint::Empty, _) | (_, Constraint::Empty) => Constraint::Empty,
            (Constraint::Range(a), Constraint::Range(b)) => match a.intersect(b) {
                Some(range) => Constraint::Range(range),
                None => Constraint::Empty,
            },
            _ => {
                let mut out = Vec::new();
                for a in self.ranges() {
                    for b in other.ranges() {
                        if let Some(range) = a.intersect(b) {
                            out.push(range);
                        }
                    }
                }
                Constraint::from_ranges(out)
            }
        }
    }

    /// Union two constraints.
    pub fn union(&self, other: &Constraint) -> Constraint {
        match (self, other) {
            (Constraint::Any, _) | (_, Constraint::Any) => Constraint::Any,
            (Constraint::Empty, _) => other.clone(),
            (_, Constraint::Empty) => self.clone(),
            _ => {
                let mut out: Vec<VersionRange> = self.ranges().to_vec();
                out.extend(other.ranges().iter().cloned());
                Constraint::from_ranges(out)
            }
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Constraint::Any)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Constraint::Empty)
    }

    /// Whether any bound references a pre-release version. A plain
    /// constraint never matches pre-release candidates; one whose bound
    /// names a pre-release opts in.
    pub fn references_prerelease(&self) -> bool {
        self.ranges().iter().any(|r| {
            r.min.as_ref().is_some_and(Version::is_prerelease)
                || r.max.as_ref().is_some_and(Version::is_prerelease)
        })
    }

    fn ranges(&self) -> &[VersionRange] {
        match self {
            Constraint::Range(range) => std::slice::from_ref(range),
            Constraint::Union(ranges) => ranges,
            _ => &[],
        }
    }

    fn from_ranges(mut ranges: Vec<VersionRange>) -> Constraint {
        match ranges.len() {
            0 => Constraint::Empty,
            1 => Constraint::Range(ranges.pop().unwrap()),
            _ => Constraint::Union(ranges),
        }
    }
}

fn parse_primitive(part: &str, whole: &str) -> PyriteResult<Constraint> {
    if part.is_empty() {
        return Err(PyriteError::parse("empty constraint member", whole));
    }
    if part == "*" {
        return Ok(Constraint::Any);
    }

    if let Some(rest) = part.strip_prefix('^') {
        let version = Version::parse(rest.trim())?;
        let upper = version.next_breaking();
        return Ok(Constraint::Range(VersionRange {
            min: Some(version),
            max: Some(upper),
            include_min: true,
            include_max: false,
        }));
    }

    if let Some(rest) = part.strip_prefix("~=").or_else(|| part.strip_prefix('~')) {
        let version = Version::parse(rest.trim())?;
        let upper = match version.precision() {
            0 | 1 | 2 => version.next_major(),
            3 => version.next_minor(),
            _ => version.next_patch(),
        };
        // `~1.2.3` caps at the next minor; `~1` caps at the next major.
        let upper = if part.starts_with("~=") {
            upper
        } else if version.precision() >= 2 {
            version.next_minor()
        } else {
            version.next_major()
        };
        return Ok(Constraint::Range(VersionRange {
            min: Some(version),
            max: Some(upper),
            include_min: true,
            include_max: false,
        }));
    }

    for op in [">=", "<=", "==", "!=", ">", "<", "="] {
        if let Some(rest) = part.strip_prefix(op) {
            return build_comparison(op, rest.trim(), whole);
        }
    }

    // No operator: a bare version (exact) or a wildcard pattern.
    if part.contains('*') {
        return wildcard_range(part, whole);
    }
    if part.starts_with(|c: char| !c.is_ascii_alphanumeric() && c != 'v') {
        return Err(PyriteError::parse(
            format!("unknown operator in `{part}`"),
            whole,
        ));
    }
    let version = Version::parse(part)?;
    Ok(Constraint::Range(VersionRange::exact(version)))
}

fn build_comparison(op: &str, value: &str, whole: &str) -> PyriteResult<Constraint> {
    if value.is_empty() {
        return Err(PyriteError::parse(
            format!("`{op}` is missing a version"),
            whole,
        ));
    }

    if value.contains('*') {
        let wildcard = wildcard_range(value, whole)?;
        return match op {
            "=" | "==" => Ok(wildcard),
            "!=" => Ok(complement_of(&wildcard)),
            _ => Err(PyriteError::parse(
                format!("wildcard not allowed with `{op}`"),
                whole,
            )),
        };
    }

    let version = Version::parse(value)?;
    let range = match op {
        "=" | "==" => VersionRange::exact(version),
        "!=" => {
            return Ok(complement_of(&Constraint::Range(VersionRange::exact(
                version,
            ))))
        }
        ">" => VersionRange {
            min: Some(version),
            max: None,
            include_min: false,
            include_max: false,
        },
        ">=" => VersionRange {
            min: Some(version),
            max: None,
            include_min: true,
            include_max: false,
        },
        "<" => VersionRange {
            min: None,
            max: Some(version),
            include_min: false,
            include_max: false,
        },
        "<=" => VersionRange {
            min: None,
            max: Some(version),
            include_min: false,
            include_max: true,
        },
        _ => unreachable!("operator list is closed"),
    };
    Ok(Constraint::Range(range))
}

/// `1.2.*` covers `>=1.2, <1.3`; bare `*` covers everything.
fn wildcard_range(pattern: &str, whole: &str) -> PyriteResult<Constraint> {
    let base = pattern
        .strip_suffix(".*")
        .or_else(|| pattern.strip_suffix('*'))
        .ok_or_else(|| {
            PyriteError::parse(format!("malformed wildcard `{pattern}`"), whole)
        })?;
    if base.is_empty() {
        return Ok(Constraint::Any);
    }
    let version = Version::parse(base)?;
    let upper = match version.precision() {
        0 | 1 => version.next_major(),
        2 => version.next_minor(),
        _ => version.next_patch(),
    };
    Ok(Constraint::Range(VersionRange {
        min: Some(version),
        max: Some(upper),
        include_min: true,
        include_max: false,
    }))
}

/// The complement of a bounded constraint (used for `!=`).
fn complement_of(constraint: &Constraint) -> Constraint {
    let mut out = Vec::new();
    for range in constraint.ranges() {
        if let Some(min) = &range.min {
            out.push(VersionRange {
                min: None,
                max: Some(min.clone()),
                include_min: false,
                include_max: !range.include_min,
            });
        }
        if let Some(max) = &range.max {
            out.push(VersionRange {
                min: Some(max.clone()),
                max: None,
                include_min: !range.include_max,
                include_max: false,
            });
        }
    }
    Constraint::from_ranges(out)
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Any => f.write_str("*"),
            Constraint::Empty => f.write_str("<empty>"),
            Constraint::Range(range) => write!(f, "{range}"),
            Constraint::Union(ranges) => {
                for (i, range) in ranges.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" || ")?;
                    }
                    write!(f, "{range}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            return write!(f, "=={}", self.min.as_ref().unwrap());
        }
        let mut wrote = false;
        if let Some(min) = &self.min {
            write!(f, "{}{min}", if self.include_min { ">=" } else { ">" })?;
            wrote = true;
        }
        if let Some(max) = &self.max {
            if wrote {
                f.write_str(",")?;
            }
            write!(f, "{}{max}", if self.include_max { "<=" } else { "<" })?;
            wrote = true;
        }
        if !wrote {
            f.write_str("*")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    fn c(text: &str) -> Constraint {
        Constraint::parse(text).unwrap()
    }

    #[test]
    fn caret_range() {
        let caret = c("^2.18");
        assert!(caret.allows(&v("2.18.0")));
        assert!(caret.allows(&v("2.20.0")));
        assert!(!caret.allows(&v("3.0.0")));
        assert!(!caret.allows(&v("2.17.9")));
    }

    #[test]
    fn caret_zero_major() {
        let caret = c("^0.3");
        assert!(caret.allows(&v("0.3.5")));
        assert!(!caret.allows(&v("0.4.0")));
    }

    #[test]
    fn tilde_range() {
        let tilde = c("~1.2.3");
        assert!(tilde.allows(&v("1.2.9")));
        assert!(!tilde.allows(&v("1.3.0")));

        let loose = c("~1");
        assert!(loose.allows(&v("1.9.0")));
        assert!(!loose.allows(&v("2.0.0")));
    }

    #[test]
    fn compatible_release_operator() {
        let compat = c("~=2.2");
        assert!(compat.allows(&v("2.9.0")));
        assert!(!compat.allows(&v("3.0.0")));

        let compat = c("~=1.4.5");
        assert!(compat.allows(&v("1.4.9")));
        assert!(!compat.allows(&v("1.5.0")));
    }

    #[test]
    fn comparison_operators() {
        assert!(c(">=1.0").allows(&v("1.0")));
        assert!(!c(">1.0").allows(&v("1.0")));
        assert!(c("<=2.0").allows(&v("2.0")));
        assert!(!c("<2.0").allows(&v("2.0")));
        assert!(c("==1.5").allows(&v("1.5.0")));
        assert!(!c("!=1.5").allows(&v("1.5")));
        assert!(c("!=1.5").allows(&v("1.6")));
    }

    #[test]
    fn bare_version_is_exact() {
        let exact = c("2.18.4");
        assert!(exact.allows(&v("2.18.4")));
        assert!(!exact.allows(&v("2.18.5")));
    }

    #[test]
    fn wildcard_patterns() {
        assert!(c("*").is_any());
        let minor = c("1.2.*");
        assert!(minor.allows(&v("1.2.9")));
        assert!(!minor.allows(&v("1.3.0")));
        let eq_wild = c("==2.*");
        assert!(eq_wild.allows(&v("2.7")));
        assert!(!eq_wild.allows(&v("3.0")));
    }

    #[test]
    fn comma_means_intersection() {
        let range = c(">=1.0,<2.0");
        assert!(range.allows(&v("1.5")));
        assert!(!range.allows(&v("2.0")));
        assert!(!range.allows(&v("0.9")));
    }

    #[test]
    fn pipe_means_union() {
        let union = c("~2.7 || ~2.6");
        assert!(union.allows(&v("2.7.5")));
        assert!(union.allows(&v("2.6.1")));
        assert!(!union.allows(&v("2.8.0")));
    }

    #[test]
    fn disjoint_intersection_is_empty_sentinel() {
        let result = c(">2.0").intersect(&c("<1.0"));
        assert!(result.is_empty());
        assert_eq!(result, Constraint::Empty);
    }

    #[test]
    fn touching_exclusive_bounds_are_empty() {
        let result = c(">=2.0").intersect(&c("<2.0"));
        assert!(result.is_empty());
    }

    #[test]
    fn touching_inclusive_bounds_pin_exactly() {
        let result = c(">=2.0").intersect(&c("<=2.0"));
        assert!(result.allows(&v("2.0")));
        assert!(!result.allows(&v("2.0.1")));
    }

    #[test]
    fn intersection_distributes_over_union() {
        let result = c("~2.6 || ~2.7").intersect(&c(">=2.7"));
        assert!(result.allows(&v("2.7.3")));
        assert!(!result.allows(&v("2.6.5")));
    }

    #[test]
    fn intersection_law() {
        let cases = ["^1.0", ">=1.2,<3", "~2.7 || ~2.6", "!=2.0", "*", "<1.0"];
        let probes = ["0.9", "1.0", "1.2.5", "2.0", "2.6.3", "2.7.1", "3.1"];
        for a in cases {
            for b in cases {
                let both = c(a).intersect(&c(b));
                for probe in probes {
                    let version = v(probe);
                    assert_eq!(
                        both.allows(&version),
                        c(a).allows(&version) && c(b).allows(&version),
                        "{a} ∩ {b} at {probe}"
                    );
                }
            }
        }
    }

    #[test]
    fn union_law() {
        let a = c("<1.0");
        let b = c(">=2.0");
        let either = a.union(&b);
        assert!(either.allows(&v("0.5")));
        assert!(either.allows(&v("2.5")));
        assert!(!either.allows(&v("1.5")));
    }

    #[test]
    fn prerelease_reference_detection() {
        assert!(c(">=0.3.0.dev2").references_prerelease());
        assert!(!c(">=0.3.0").references_prerelease());
        assert!(!c("^2.18").references_prerelease());
    }

    #[test]
    fn parse_errors_name_offender() {
        for bad in ["", ">=", "=>1.0", "?1.0", "1.0 |"] {
            let err = Constraint::parse(bad).unwrap_err();
            assert!(matches!(err, PyriteError::Parse { .. }), "{bad}");
        }
        let err = Constraint::parse(">=1.0,<nonsense").unwrap_err();
        assert!(err.to_string().contains("nonsense"));
    }

    #[test]
    fn display_round_trip_meaning() {
        for text in ["^2.18", ">=1.0,<2.0", "~2.7 || ~2.6", "==1.5"] {
            let parsed = c(text);
            let reparsed = Constraint::parse(&parsed.to_string()).unwrap();
            for probe in ["1.0", "1.5", "2.6.3", "2.18.4", "2.99.0", "3.0"] {
                assert_eq!(parsed.allows(&v(probe)), reparsed.allows(&v(probe)));
            }
        }
    }
}
