//! PyPI-style JSON index repository.
//!
//! The primary path queries the structured metadata endpoint
//! (`{base}/{name}/json`, `{base}/{name}/{version}/json`). When a release
//! omits machine-readable dependency metadata, the fallback path downloads
//! the best-fit wheel and reads its embedded `METADATA`, or failing that
//! the sdist, reading its declarative build configuration. Nothing is ever
//! executed to learn dependencies.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use pyrite_core::constraint::Constraint;
use pyrite_core::dependency::{canonicalize_name, Dependency};
use pyrite_core::environment::Environment;
use pyrite_core::package::{Package, PackageFile, PackageId};
use pyrite_core::version::Version;
use pyrite_util::errors::{PyriteError, PyriteResult};

use crate::download::{build_client, fetch_bytes, fetch_json, DEFAULT_TIMEOUT};
use crate::metadata::parse_core_metadata;
use crate::sdist::read_sdist_metadata;
use crate::wheel::{best_matching_wheel, read_wheel_metadata};

/// The canonical public index.
pub const PYPI_URL: &str = "https://pypi.org/pypi";

/// A JSON-API package index.
#[derive(Debug)]
pub struct PypiRepository {
    name: String,
    url: String,
    client: Client,
    fallback: bool,
    environment: Environment,
    /// Built packages keyed by (name, version). Written once per key;
    /// a concurrent double-fill is benign since content is deterministic.
    cache: RwLock<HashMap<PackageId, Arc<Package>>>,
}

impl PypiRepository {
    pub fn new(name: &str, url: &str, environment: Environment) -> PyriteResult<Self> {
        Self::with_timeout(name, url, environment, DEFAULT_TIMEOUT)
    }

    /// Build a repository whose requests honor the caller's timeout.
    pub fn with_timeout(
        name: &str,
        url: &str,
        environment: Environment,
        timeout: Duration,
    ) -> PyriteResult<Self> {
        Ok(Self {
            name: name.to_string(),
            url: url.trim_end_matches('/').to_string(),
            client: build_client(timeout)?,
            fallback: true,
            environment,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Disable the artifact-inspection fallback (index metadata only).
    pub fn without_fallback(mut self) -> Self {
        self.fallback = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Every version of `name` satisfying `constraint`, newest first.
    /// Pre-releases are excluded unless the constraint references one.
    pub async fn find_packages(
        &self,
        name: &str,
        constraint: &Constraint,
    ) -> PyriteResult<Vec<Arc<Package>>> {
        let canonical = canonicalize_name(name);
        let url = format!("{}/{}/json", self.url, canonical);
        let Some(value) = fetch_json(&self.client, &url).await? else {
            tracing::debug!(package = %canonical, repository = %self.name, "project not in index");
            return Ok(Vec::new());
        };
        let project: ProjectResponse =
            serde_json::from_value(value).map_err(|e| PyriteError::Network {
                message: format!("Malformed index response for {canonical}: {e}"),
            })?;

        let allow_prereleases = constraint.references_prerelease();
        let mut out: Vec<Arc<Package>> = Vec::new();
        for (version_text, files) in &project.releases {
            let Ok(version) = Version::parse(version_text) else {
                tracing::debug!(%version_text, "skipping unparsable release version");
                continue;
            };
            if !constraint.allows(&version) {
                continue;
            }
            if version.is_prerelease() && !allow_prereleases {
                continue;
            }
            let mut package = Package::new(&project.info.name, version);
            package.source_url = Some(format!("{}/{}/{version_text}", self.url, canonical));
            package.files = package_files(files);
            out.push(Arc::new(package));
        }

        out.sort_by(|a, b| b.version().cmp(a.version()));
        Ok(out)
    }

    /// Full metadata for one exact version, building it from distribution
    /// artifacts when the index carries none.
    pub async fn get_package(&self, name: &str, version: &Version) -> PyriteResult<Arc<Package>> {
        let canonical = canonicalize_name(name);
        let id = PackageId {
            name: canonical.clone(),
            version: version.clone(),
        };
        if let Some(hit) = self.cache_get(&id) {
            tracing::debug!(package = %id, "metadata cache hit");
            return Ok(hit);
        }

        let url = format!("{}/{}/{}/json", self.url, canonical, version);
        let Some(value) = fetch_json(&self.client, &url).await? else {
            return Err(PyriteError::not_found_at(canonical, version));
        };
        let release: VersionResponse =
            serde_json::from_value(value).map_err(|e| PyriteError::Network {
                message: format!("Malformed index response for {id}: {e}"),
            })?;

        let (requires_dist, discovered_python) = match &release.info.requires_dist {
            Some(list) if !list.is_empty() => (list.clone(), None),
            _ if self.fallback => {
                tracing::debug!(package = %id, "no index metadata, inspecting artifacts");
                self.discover_requires(&release.urls).await?
            }
            _ => (Vec::new(), None),
        };

        let requires_python = release
            .info
            .requires_python
            .clone()
            .or(discovered_python);

        let source_url = format!("{}/{}/{}", self.url, canonical, version);
        let package = assemble_package(
            &release.info.name,
            version.clone(),
            &release.urls,
            &requires_dist,
            requires_python.as_deref(),
            &source_url,
        )?;

        let package = Arc::new(package);
        self.cache_put(id, package.clone());
        Ok(package)
    }

    fn cache_get(&self, id: &PackageId) -> Option<Arc<Package>> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    fn cache_put(&self, id: PackageId, package: Arc<Package>) {
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, package);
    }

    /// Artifact-inspection fallback: best-fit wheel `METADATA` first, then
    /// static sdist declarations. An empty result is a documented
    /// limitation (dynamic build script), not a failure.
    async fn discover_requires(
        &self,
        files: &[ReleaseFile],
    ) -> PyriteResult<(Vec<String>, Option<String>)> {
        let wheel_names = files
            .iter()
            .map(|f| f.filename.as_str())
            .filter(|f| f.ends_with(".whl"));
        if let Some(best) = best_matching_wheel(wheel_names, &self.environment) {
            if let Some(file) = files.iter().find(|f| f.filename == best) {
                tracing::debug!(wheel = %best, "reading embedded wheel metadata");
                if let Some(bytes) = fetch_bytes(&self.client, &file.url).await? {
                    if let Some(text) = read_wheel_metadata(&bytes)? {
                        let core = parse_core_metadata(&text);
                        return Ok((core.requires_dist, core.requires_python));
                    }
                }
            }
        }

        let mut sdists: Vec<&ReleaseFile> = files
            .iter()
            .filter(|f| is_sdist_filename(&f.filename))
            .collect();
        sdists.sort_by(|a, b| a.filename.cmp(&b.filename));
        if let Some(file) = sdists.first() {
            tracing::debug!(sdist = %file.filename, "statically reading sdist declarations");
            if let Some(bytes) = fetch_bytes(&self.client, &file.url).await? {
                if let Some(meta) = read_sdist_metadata(&bytes, &file.filename)? {
                    return Ok((meta.requires_dist, meta.requires_python));
                }
            }
        }

        tracing::warn!(
            "no statically readable dependency metadata; resolving with zero dependencies"
        );
        Ok((Vec::new(), None))
    }
}

/// Build an immutable package from resolved metadata pieces. Dependencies
/// gated on `extra == "…"` markers land in the extras map, marker intact.
fn assemble_package(
    pretty_name: &str,
    version: Version,
    files: &[ReleaseFile],
    requires_dist: &[String],
    requires_python: Option<&str>,
    source_url: &str,
) -> PyriteResult<Package> {
    let mut package = Package::new(pretty_name, version);
    package.source_url = Some(source_url.to_string());
    package.files = package_files(files);
    if let Some(spec) = requires_python {
        package.python_constraint = Constraint::parse(spec)?;
    }

    for line in requires_dist {
        let dep = Dependency::parse(line)?;
        let gated = dep.marker.gated_extras();
        if gated.is_empty() {
            package.requires.push(dep);
        } else {
            for extra in gated {
                package
                    .extras
                    .entry(canonicalize_name(&extra))
                    .or_default()
                    .push(dep.clone());
            }
        }
    }

    Ok(package)
}

fn package_files(files: &[ReleaseFile]) -> Vec<PackageFile> {
    files
        .iter()
        .map(|f| PackageFile {
            file: f.filename.clone(),
            hash: f
                .digests
                .as_ref()
                .and_then(|d| d.sha256.as_ref())
                .map(|h| format!("sha256:{h}"))
                .or_else(|| f.md5_digest.as_ref().map(|h| format!("md5:{h}"))),
        })
        .collect()
}

fn is_sdist_filename(filename: &str) -> bool {
    filename.ends_with(".tar.gz")
        || filename.ends_with(".tgz")
        || filename.ends_with(".tar.bz2")
        || (filename.ends_with(".zip") && !filename.ends_with(".whl"))
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    info: ProjectInfo,
    #[serde(default)]
    releases: BTreeMap<String, Vec<ReleaseFile>>,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    info: ProjectInfo,
    #[serde(default)]
    urls: Vec<ReleaseFile>,
}

#[derive(Debug, Deserialize)]
struct ProjectInfo {
    name: String,
    #[serde(default)]
    requires_dist: Option<Vec<String>>,
    #[serde(default)]
    requires_python: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    filename: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    digests: Option<Digests>,
    #[serde(default)]
    md5_digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Digests {
    #[serde(default)]
    sha256: Option<String>,
}
