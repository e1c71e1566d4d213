//! Static metadata extraction from source distributions.
//!
//! Dependency declarations are recovered from declarative files only:
//! `pyproject.toml` `[project]` tables, `*.egg-info/requires.txt`,
//! `PKG-INFO` headers, and literal `install_requires`/`extras_require`
//! lists in `setup.py`. Build scripts are never executed; a dynamically
//! constructed declaration yields no discovered dependencies.

use std::collections::BTreeMap;
use std::io::Read;

use pyrite_util::errors::{PyriteError, PyriteResult};

use crate::metadata::parse_core_metadata;

/// Dependency declarations recovered from an sdist.
#[derive(Debug, Clone, Default)]
pub struct SdistMetadata {
    /// Requirement lines, extras encoded as `; extra == "…"` markers.
    pub requires_dist: Vec<String>,
    pub requires_python: Option<String>,
}

/// Files inside the archive that can carry dependency declarations.
#[derive(Debug, Default)]
struct SdistFiles {
    pyproject: Option<String>,
    requires_txt: Option<String>,
    pkg_info: Option<String>,
    setup_py: Option<String>,
}

/// Statically read dependency metadata out of sdist archive bytes.
///
/// `Ok(None)` means the archive held no statically readable declarations;
/// the package then resolves with zero discovered dependencies.
pub fn read_sdist_metadata(bytes: &[u8], filename: &str) -> PyriteResult<Option<SdistMetadata>> {
    let files = if filename.ends_with(".zip") {
        collect_from_zip(bytes)?
    } else if filename.ends_with(".tar.gz") || filename.ends_with(".tgz") {
        collect_from_tar(flate2::read::GzDecoder::new(bytes))?
    } else if filename.ends_with(".tar.bz2") {
        collect_from_tar(bzip2::read::BzDecoder::new(bytes))?
    } else {
        return Err(PyriteError::parse("unrecognized sdist extension", filename));
    };

    Ok(extract(&files))
}

fn extract(files: &SdistFiles) -> Option<SdistMetadata> {
    if let Some(meta) = files.pyproject.as_deref().and_then(from_pyproject) {
        return Some(meta);
    }
    if let Some(meta) = files.requires_txt.as_deref().map(from_requires_txt) {
        if !meta.requires_dist.is_empty() {
            return Some(meta);
        }
    }
    if let Some(text) = files.pkg_info.as_deref() {
        let core = parse_core_metadata(text);
        if !core.requires_dist.is_empty() {
            return Some(SdistMetadata {
                requires_dist: core.requires_dist,
                requires_python: core.requires_python,
            });
        }
    }
    files.setup_py.as_deref().and_then(from_setup_py)
}

fn collect_from_tar<R: Read>(reader: R) -> PyriteResult<SdistFiles> {
    let mut archive = tar::Archive::new(reader);
    let mut files = SdistFiles::default();

    for entry in archive.entries().map_err(PyriteError::Io)? {
        let mut entry = entry.map_err(PyriteError::Io)?;
        let path = entry.path().map_err(PyriteError::Io)?.into_owned();
        let path_str = path.to_string_lossy().to_string();
        if let Some(slot) = classify_path(&path_str, &mut files) {
            let mut content = String::new();
            if entry.read_to_string(&mut content).is_ok() {
                *slot = Some(content);
            }
        }
    }

    Ok(files)
}

fn collect_from_zip(bytes: &[u8]) -> PyriteResult<SdistFiles> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| {
        PyriteError::Generic {
            message: format!("Failed to open sdist archive: {e}"),
        }
    })?;
    let mut files = SdistFiles::default();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| PyriteError::Generic {
            message: format!("Failed to read sdist entry: {e}"),
        })?;
        let name = entry.name().to_string();
        if let Some(slot) = classify_path(&name, &mut files) {
            let mut content = String::new();
            if entry.read_to_string(&mut content).is_ok() {
                *slot = Some(content);
            }
        }
    }

    Ok(files)
}

/// Route an archive path to the metadata slot it may fill. Only files at
/// the distribution root (one directory deep) count; a vendored
/// sub-package's `setup.py` must not shadow the real one.
fn classify_path<'a>(path: &str, files: &'a mut SdistFiles) -> Option<&'a mut Option<String>> {
    let depth = path.trim_end_matches('/').matches('/').count();
    let basename = path.rsplit('/').next().unwrap_or(path);

    match basename {
        "pyproject.toml" if depth <= 1 && files.pyproject.is_none() => Some(&mut files.pyproject),
        "PKG-INFO" if depth <= 1 && files.pkg_info.is_none() => Some(&mut files.pkg_info),
        "setup.py" if depth <= 1 && files.setup_py.is_none() => Some(&mut files.setup_py),
        "requires.txt"
            if path.contains(".egg-info/") && files.requires_txt.is_none() =>
        {
            Some(&mut files.requires_txt)
        }
        _ => None,
    }
}

/// `[project]` dependency tables. A project that declares its dependencies
/// dynamic has nothing static to read.
fn from_pyproject(text: &str) -> Option<SdistMetadata> {
    let doc: toml::Value = toml::from_str(text).ok()?;
    let project = doc.get("project")?;

    let dynamic: Vec<&str> = project
        .get("dynamic")
        .and_then(|d| d.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    if dynamic.contains(&"dependencies") {
        return None;
    }

    let mut requires_dist: Vec<String> = project
        .get("dependencies")
        .and_then(|d| d.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    if let Some(optional) = project
        .get("optional-dependencies")
        .and_then(|o| o.as_table())
    {
        for (extra, deps) in optional {
            if let Some(deps) = deps.as_array() {
                for dep in deps.iter().filter_map(|v| v.as_str()) {
                    requires_dist.push(append_extra_marker(dep, extra));
                }
            }
        }
    }

    if requires_dist.is_empty() && project.get("dependencies").is_none() {
        return None;
    }

    Some(SdistMetadata {
        requires_dist,
        requires_python: project
            .get("requires-python")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    })
}

/// `requires.txt` section format: a bare section of base requirements,
/// `[extra]` sections, and condition sections `[extra:marker]` / `[:marker]`.
fn from_requires_txt(text: &str) -> SdistMetadata {
    let mut requires_dist = Vec::new();
    let mut section: Option<(Option<String>, Option<String>)> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let (extra, marker) = match header.split_once(':') {
                Some((extra, marker)) => (
                    (!extra.is_empty()).then(|| extra.to_string()),
                    (!marker.is_empty()).then(|| marker.to_string()),
                ),
                None => ((!header.is_empty()).then(|| header.to_string()), None),
            };
            section = Some((extra, marker));
            continue;
        }

        let mut requirement = line.to_string();
        if let Some((extra, marker)) = &section {
            let mut clauses = Vec::new();
            if let Some(marker) = marker {
                clauses.push(marker.clone());
            }
            if let Some(extra) = extra {
                clauses.push(format!("extra == \"{extra}\""));
            }
            if !clauses.is_empty() {
                requirement = format!("{requirement} ; {}", clauses.join(" and "));
            }
        }
        requires_dist.push(requirement);
    }

    SdistMetadata {
        requires_dist,
        requires_python: None,
    }
}

/// Literal-level scan of `setup.py`: only plain string-list and dict
/// literals are recovered. Anything computed at build time is invisible.
fn from_setup_py(src: &str) -> Option<SdistMetadata> {
    let install = extract_string_list(src, "install_requires");
    let extras = extract_extras_dict(src, "extras_require");
    let requires_python = extract_string_value(src, "python_requires");

    if install.is_none() && extras.is_none() {
        return None;
    }

    let mut requires_dist = install.unwrap_or_default();
    if let Some(extras) = extras {
        for (key, deps) in extras {
            for dep in deps {
                // `:marker`-style keys gate on a condition, not an extra.
                let requirement = match key.split_once(':') {
                    Some(("", marker)) => format!("{dep} ; {marker}"),
                    Some((extra, marker)) => {
                        format!("{dep} ; {marker} and extra == \"{extra}\"")
                    }
                    None => append_extra_marker(&dep, &key),
                };
                requires_dist.push(requirement);
            }
        }
    }

    Some(SdistMetadata {
        requires_dist,
        requires_python,
    })
}

fn append_extra_marker(dep: &str, extra: &str) -> String {
    if dep.contains(';') {
        format!("{dep} and extra == \"{extra}\"")
    } else {
        format!("{dep} ; extra == \"{extra}\"")
    }
}

/// Find `keyword` used as a keyword argument (`keyword = <value>`) and
/// return the byte offset just past the `=`.
fn find_assignment(src: &str, keyword: &str) -> Option<usize> {
    let mut search_from = 0;
    while let Some(pos) = src[search_from..].find(keyword) {
        let start = search_from + pos;
        let after = start + keyword.len();
        // Reject partial identifier matches.
        let before_ok = start == 0
            || !src[..start]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        let rest = src[after..].trim_start();
        if before_ok && rest.starts_with('=') && !rest.starts_with("==") {
            let eq = src[after..].find('=').unwrap();
            return Some(after + eq + 1);
        }
        search_from = after;
    }
    None
}

fn extract_string_list(src: &str, keyword: &str) -> Option<Vec<String>> {
    let start = find_assignment(src, keyword)?;
    let rest = src[start..].trim_start();
    if !rest.starts_with('[') {
        return None;
    }
    parse_list_literal(rest).map(|(items, _)| items)
}

fn extract_extras_dict(src: &str, keyword: &str) -> Option<BTreeMap<String, Vec<String>>> {
    let start = find_assignment(src, keyword)?;
    let rest = src[start..].trim_start();
    if !rest.starts_with('{') {
        return None;
    }

    let mut out = BTreeMap::new();
    let mut cursor = &rest[1..];
    loop {
        cursor = skip_trivia(cursor);
        if cursor.starts_with('}') {
            return Some(out);
        }
        let (key, after_key) = parse_string_literal(cursor)?;
        cursor = skip_trivia(after_key);
        cursor = cursor.strip_prefix(':')?;
        cursor = skip_trivia(cursor);
        let (values, after_values) = parse_list_literal(cursor)?;
        out.insert(key, values);
        cursor = skip_trivia(after_values);
        if let Some(after) = cursor.strip_prefix(',') {
            cursor = after;
        }
    }
}

fn extract_string_value(src: &str, keyword: &str) -> Option<String> {
    let start = find_assignment(src, keyword)?;
    let rest = skip_trivia(&src[start..]);
    parse_string_literal(rest).map(|(value, _)| value)
}

/// Parse a `[...]` of string literals. Bails (dynamic content) on any
/// non-literal element.
fn parse_list_literal(text: &str) -> Option<(Vec<String>, &str)> {
    let mut cursor = text.strip_prefix('[')?;
    let mut items = Vec::new();
    loop {
        cursor = skip_trivia(cursor);
        if let Some(after) = cursor.strip_prefix(']') {
            return Some((items, after));
        }
        let (value, after) = parse_string_literal(cursor)?;
        items.push(value);
        cursor = skip_trivia(after);
        if let Some(after) = cursor.strip_prefix(',') {
            cursor = after;
        } else if !cursor.starts_with(']') {
            return None;
        }
    }
}

fn parse_string_literal(text: &str) -> Option<(String, &str)> {
    let quote = text.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let mut value = String::new();
    let mut chars = text[1..].char_indices();
    while let Some((i, ch)) = chars.next() {
        match ch {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    value.push(escaped);
                }
            }
            c if c == quote => return Some((value, &text[1 + i + 1..])),
            c => value.push(c),
        }
    }
    None
}

/// Skip whitespace and `#` comments.
fn skip_trivia(text: &str) -> &str {
    let mut rest = text;
    loop {
        let trimmed = rest.trim_start();
        if let Some(after) = trimmed.strip_prefix('#') {
            rest = match after.find('\n') {
                Some(nl) => &after[nl + 1..],
                None => "",
            };
        } else {
            return trimmed;
        }
    }
}
