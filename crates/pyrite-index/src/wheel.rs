//! Wheel filename parsing and platform-specific artifact selection.
//!
//! Wheel filenames encode `name-version(-build)?-python-abi-platform.whl`.
//! Tag fields may be compound (dot-joined), meaning the artifact supports
//! any of the sub-tags. Selection is pure: identical inputs always pick
//! the identical artifact, since the pick decides which metadata becomes
//! authoritative for a package.

use std::io::{Cursor, Read};

use pyrite_core::environment::{Environment, OsFamily};
use pyrite_util::errors::{PyriteError, PyriteResult};

/// A wheel filename split into its tag fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelName {
    pub name: String,
    pub version: String,
    pub build: Option<String>,
    pub python_tags: Vec<String>,
    pub abi_tags: Vec<String>,
    pub platform_tags: Vec<String>,
}

impl WheelName {
    /// Parse a wheel filename per the dashed-field convention.
    pub fn parse(filename: &str) -> PyriteResult<Self> {
        let stem = filename
            .strip_suffix(".whl")
            .ok_or_else(|| PyriteError::parse("not a wheel filename", filename))?;

        let parts: Vec<&str> = stem.split('-').collect();
        let (name, version, build) = match parts.len() {
            5 => (parts[0], parts[1], None),
            6 => (parts[0], parts[1], Some(parts[2].to_string())),
            _ => {
                return Err(PyriteError::parse(
                    format!("expected 5 or 6 dashed fields, found {}", parts.len()),
                    filename,
                ))
            }
        };

        let tag_base = parts.len() - 3;
        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
            build,
            python_tags: parts[tag_base].split('.').map(str::to_string).collect(),
            abi_tags: parts[tag_base + 1].split('.').map(str::to_string).collect(),
            platform_tags: parts[tag_base + 2].split('.').map(str::to_string).collect(),
        })
    }

    /// Whether this wheel is installable in `env`.
    pub fn supports(&self, env: &Environment) -> bool {
        self.python_tags.iter().any(|t| python_tag_matches(t, env))
            && self.abi_tags.iter().any(|t| abi_tag_matches(t, env))
            && self.platform_tags.iter().any(|t| platform_tag_matches(t, env))
    }

    /// Specificity rank: an exact interpreter-version tag beats a generic
    /// one, and a real platform tag beats universal `any`.
    fn specificity(&self, env: &Environment) -> (bool, bool) {
        let exact_interpreter = self
            .python_tags
            .iter()
            .any(|t| python_tag_matches(t, env) && *t == env.interpreter_tag());
        let platform_specific = self
            .platform_tags
            .iter()
            .any(|t| platform_tag_matches(t, env) && t != "any");
        (exact_interpreter, platform_specific)
    }
}

/// Pick the single best-matching wheel for `env` from a set of filenames,
/// or `None` when nothing is compatible. Ties break by ascending filename
/// order.
pub fn best_matching_wheel<'a, I>(filenames: I, env: &Environment) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut sorted: Vec<&str> = filenames.into_iter().collect();
    sorted.sort_unstable();

    let mut best: Option<(String, (bool, bool))> = None;
    for filename in sorted {
        let Ok(wheel) = WheelName::parse(filename) else {
            tracing::debug!(filename, "skipping unparsable wheel filename");
            continue;
        };
        if !wheel.supports(env) {
            continue;
        }
        let score = wheel.specificity(env);
        // Strictly-greater keeps the lexicographically first among equals.
        if best.as_ref().map_or(true, |(_, s)| score > *s) {
            best = Some((filename.to_string(), score));
        }
    }
    best.map(|(filename, _)| filename)
}

fn python_tag_matches(tag: &str, env: &Environment) -> bool {
    let (major, minor, _) = env.python_version;
    if tag == format!("py{major}") || tag == format!("py{major}{minor}") {
        return true;
    }
    let prefix = env.interpreter_prefix();
    tag == format!("{prefix}{major}{minor}") || tag == format!("{prefix}{major}")
}

fn abi_tag_matches(tag: &str, env: &Environment) -> bool {
    if tag == "none" {
        return true;
    }
    if tag == "abi3" {
        return env.interpreter_prefix() == "cp";
    }
    // Implementation-specific tags (`cp37m`, `cp27mu`) must belong to the
    // target interpreter family and version.
    tag.starts_with(&env.interpreter_tag())
}

fn platform_tag_matches(tag: &str, env: &Environment) -> bool {
    if tag == "any" {
        return true;
    }
    match env.os {
        OsFamily::Windows => {
            if env.is_32bit {
                tag == "win32"
            } else {
                tag == "win_amd64"
            }
        }
        OsFamily::Linux => {
            if !tag.starts_with("manylinux") && !tag.starts_with("linux") {
                return false;
            }
            linux_arches(env).iter().any(|arch| tag.ends_with(arch))
        }
        OsFamily::Macos => macos_tag_matches(tag, env),
    }
}

fn linux_arches(env: &Environment) -> &'static [&'static str] {
    if env.is_32bit {
        &["i686", "i386"]
    } else if env.platform_machine == "aarch64" || env.platform_machine == "arm64" {
        &["aarch64"]
    } else {
        &["x86_64"]
    }
}

/// `macosx_<major>_<minor>_<arch>` matches when the target release is at
/// least the tag's stated minimum and the arch is compatible (`intel` and
/// `universal` are multi-arch aliases).
fn macos_tag_matches(tag: &str, env: &Environment) -> bool {
    let Some(rest) = tag.strip_prefix("macosx_") else {
        return false;
    };
    let mut parts = rest.splitn(3, '_');
    let (Some(major), Some(minor), Some(arch)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let (Ok(major), Ok(minor)) = (major.parse::<u64>(), minor.parse::<u64>()) else {
        return false;
    };
    if (major, minor) > env.macos_release {
        return false;
    }

    let accepted: &[&str] = match env.platform_machine.as_str() {
        "arm64" | "aarch64" => &["arm64", "universal2", "universal"],
        "x86_64" => &["x86_64", "intel", "universal", "universal2", "fat64"],
        "i386" => &["i386", "intel", "universal", "fat32"],
        _ => &[],
    };
    accepted.contains(&arch) || arch == env.platform_machine
}

/// Like [`best_matching_wheel`], but for callers that cannot proceed
/// without an artifact (e.g. an installer): selecting nothing is an
/// [`PyriteError::ArtifactSelection`] error naming the environment.
pub fn require_matching_wheel<'a, I>(filenames: I, env: &Environment) -> PyriteResult<String>
where
    I: IntoIterator<Item = &'a str>,
{
    best_matching_wheel(filenames, env).ok_or_else(|| PyriteError::ArtifactSelection {
        message: format!(
            "no wheel is installable on {} ({}, python {})",
            env.sys_platform,
            env.platform_machine,
            env.python_version_short()
        ),
    })
}

/// Extract the `*.dist-info/METADATA` document from wheel archive bytes,
/// without executing anything. `Ok(None)` when the wheel carries none.
pub fn read_wheel_metadata(bytes: &[u8]) -> PyriteResult<Option<String>> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| PyriteError::Generic {
            message: format!("Failed to open wheel archive: {e}"),
        })?;

    let metadata_index = (0..archive.len()).find(|&i| {
        archive
            .by_index(i)
            .map(|f| {
                let name = f.name();
                name.ends_with("/METADATA") && name.contains(".dist-info/")
            })
            .unwrap_or(false)
    });

    let Some(index) = metadata_index else {
        return Ok(None);
    };

    let mut file = archive.by_index(index).map_err(|e| PyriteError::Generic {
        message: format!("Failed to read wheel metadata entry: {e}"),
    })?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(PyriteError::Io)?;
    Ok(Some(content))
}
