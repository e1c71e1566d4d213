//! Version parsing, comparison, and bump helpers.
//!
//! Package versions follow the Python packaging convention, which differs
//! from semver:
//! - Release segments are split on `.` and compare numerically with
//!   implicit-zero padding (`1.0` == `1.0.0`)
//! - Qualifiers have a defined ordering:
//!   `dev` < `alpha` < `beta` < `rc` < `""` (release) < `post`
//! - A local label (`1.0+cpu`) sorts after the same version without one

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use pyrite_util::errors::{PyriteError, PyriteResult};

/// A parsed package version with comparable segments.
#[derive(Debug, Clone)]
pub struct Version {
    original: String,
    release: Vec<u64>,
    qualifier: Option<(QualifierKind, u64)>,
    local: Option<String>,
}

/// Well-known version qualifiers with defined ordering.
///
/// `Release` is the implicit qualifier of a plain version and sits between
/// the pre-release kinds and `post`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum QualifierKind {
    Dev,
    Alpha,
    Beta,
    Rc,
    Release,
    Post,
}

impl Version {
    /// Build a plain release version from numeric parts.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self::from_release(vec![major, minor, patch])
    }

    /// Parse a version string such as `1.0.0`, `2.18`, `0.3.0.dev2`,
    /// `1.0.0a1`, `4.2.1.post1`, or `1.19.2+cpu`.
    pub fn parse(text: &str) -> PyriteResult<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(PyriteError::parse("empty version", text));
        }

        let (body, local) = match trimmed.split_once('+') {
            Some((body, local)) if !local.is_empty() => (body, Some(local.to_string())),
            Some(_) => return Err(PyriteError::parse("empty local label", text)),
            None => (trimmed, None),
        };
        let body = body.strip_prefix('v').unwrap_or(body);

        let mut release: Vec<u64> = Vec::new();
        let mut qualifier: Option<(QualifierKind, u64)> = None;

        for token in tokenize(body) {
            match token {
                Token::Number(n) => {
                    if let Some((_, number)) = qualifier.as_mut() {
                        *number = n;
                    } else {
                        release.push(n);
                    }
                }
                Token::Word(word) => {
                    if qualifier.is_some() {
                        return Err(PyriteError::parse(
                            format!("unexpected qualifier `{word}`"),
                            text,
                        ));
                    }
                    let kind = classify(&word)
                        .ok_or_else(|| {
                            PyriteError::parse(format!("unknown qualifier `{word}`"), text)
                        })?;
                    qualifier = Some((kind, 0));
                }
            }
        }

        if release.is_empty() {
            return Err(PyriteError::parse("no release segments", text));
        }

        Ok(Self {
            original: trimmed.to_string(),
            release,
            qualifier,
            local,
        })
    }

    pub fn major(&self) -> u64 {
        self.segment(0)
    }

    pub fn minor(&self) -> u64 {
        self.segment(1)
    }

    pub fn patch(&self) -> u64 {
        self.segment(2)
    }

    /// Number of release segments written out explicitly (`1.2` has 2).
    pub fn precision(&self) -> usize {
        self.release.len()
    }

    fn segment(&self, i: usize) -> u64 {
        self.release.get(i).copied().unwrap_or(0)
    }

    /// Whether this is a pre-release (`dev`, `alpha`, `beta`, or `rc`).
    pub fn is_prerelease(&self) -> bool {
        matches!(self.qualifier, Some((kind, _)) if kind < QualifierKind::Release)
    }

    pub fn local(&self) -> Option<&str> {
        self.local.as_deref()
    }

    /// The version with any qualifier and local label stripped.
    pub fn stable(&self) -> Version {
        let text = self
            .release
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(".");
        Version {
            original: text,
            release: self.release.clone(),
            qualifier: None,
            local: None,
        }
    }

    pub fn next_major(&self) -> Version {
        Version::from_release(vec![self.major() + 1, 0, 0])
    }

    pub fn next_minor(&self) -> Version {
        Version::from_release(vec![self.major(), self.minor() + 1, 0])
    }

    pub fn next_patch(&self) -> Version {
        Version::from_release(vec![self.major(), self.minor(), self.patch() + 1])
    }

    /// The first version this one is not compatible with under caret
    /// semantics: bump the first non-zero release segment.
    ///
    /// `^1.2.3` excludes `2.0.0`, `^0.2.3` excludes `0.3.0`, and `^0.0.3`
    /// excludes `0.0.4`.
    pub fn next_breaking(&self) -> Version {
        let first_non_zero = self.release.iter().position(|&n| n != 0);
        match first_non_zero {
            Some(0) | None => self.next_major(),
            Some(1) => self.next_minor(),
            Some(_) => self.next_patch(),
        }
    }

    fn from_release(release: Vec<u64>) -> Version {
        let text = release
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(".");
        Version {
            original: text,
            release,
            qualifier: None,
            local: None,
        }
    }

    fn effective_qualifier(&self) -> (QualifierKind, u64) {
        self.qualifier.unwrap_or((QualifierKind::Release, 0))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let max_len = self.release.len().max(other.release.len());
        for i in 0..max_len {
            let ord = self.segment(i).cmp(&other.segment(i));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        let ord = self.effective_qualifier().cmp(&other.effective_qualifier());
        if ord != Ordering::Equal {
            return ord;
        }
        match (&self.local, &other.local) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Trailing zero segments are insignificant for equality, so they
        // must be insignificant for hashing too.
        let mut trimmed = self.release.as_slice();
        while let Some((&0, rest)) = trimmed.split_last() {
            trimmed = rest;
        }
        trimmed.hash(state);
        self.effective_qualifier().hash(state);
        self.local.hash(state);
    }
}

enum Token {
    Number(u64),
    Word(String),
}

/// Split a version body into numeric and word runs, treating `.`, `-`, and
/// `_` as separators and letter/digit boundaries as implicit separators
/// (`1.0a1` lexes the same as `1.0-a.1`).
fn tokenize(body: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut current_is_digit = false;

    let mut flush = |buf: &mut String, is_digit: bool, out: &mut Vec<Token>| {
        if buf.is_empty() {
            return;
        }
        if is_digit {
            // Runs of ASCII digits; overflow on absurd segments saturates.
            out.push(Token::Number(buf.parse::<u64>().unwrap_or(u64::MAX)));
        } else {
            out.push(Token::Word(std::mem::take(buf).to_lowercase()));
            return;
        }
        buf.clear();
    };

    for ch in body.chars() {
        if ch == '.' || ch == '-' || ch == '_' {
            flush(&mut current, current_is_digit, &mut tokens);
            current.clear();
            continue;
        }
        let is_digit = ch.is_ascii_digit();
        if !current.is_empty() && is_digit != current_is_digit {
            flush(&mut current, current_is_digit, &mut tokens);
            current.clear();
        }
        current.push(ch);
        current_is_digit = is_digit;
    }
    flush(&mut current, current_is_digit, &mut tokens);

    tokens
}

fn classify(word: &str) -> Option<QualifierKind> {
    match word {
        "dev" => Some(QualifierKind::Dev),
        "a" | "alpha" => Some(QualifierKind::Alpha),
        "b" | "beta" => Some(QualifierKind::Beta),
        "c" | "rc" | "pre" | "preview" => Some(QualifierKind::Rc),
        "post" | "rev" | "r" => Some(QualifierKind::Post),
        _ => None,
    }
}
