//! Lockfile persistence round trips through the filesystem.

use pyrite_core::dependency::Dependency;
use pyrite_core::lockfile::Lockfile;
use pyrite_core::package::{Package, PackageFile};
use pyrite_core::version::Version;

fn resolved_set() -> Vec<Package> {
    let mut requests = Package::new("requests", Version::parse("2.18.4").unwrap());
    requests.source_url = Some("https://pypi.org/pypi/requests/2.18.4".to_string());
    requests.files.push(PackageFile {
        file: "requests-2.18.4-py2.py3-none-any.whl".to_string(),
        hash: Some("sha256:6a1b267aa90cac58ac3a765d067950e7dbbf75b1da07e895d1f594193a40a38b".to_string()),
    });
    requests
        .requires
        .push(Dependency::parse("idna (>=2.5,<2.7)").unwrap());

    let idna = Package::new("idna", Version::parse("2.6").unwrap());
    vec![requests, idna]
}

#[test]
fn write_and_reload() {
    let packages = resolved_set();
    let lockfile = Lockfile::from_packages(packages.iter(), "requests = \"^2.18\"");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pyrite.lock");
    std::fs::write(&path, lockfile.to_string_pretty().unwrap()).unwrap();

    let reloaded = Lockfile::from_path(&path).unwrap();
    assert_eq!(reloaded.package.len(), 2);
    assert_eq!(reloaded.package[0].name, "idna");
    assert_eq!(reloaded.package[1].name, "requests");
    assert!(reloaded.is_fresh("requests = \"^2.18\""));
    assert!(!reloaded.is_fresh("requests = \"*\""));
}

#[test]
fn reload_reconstructs_packages() {
    let lockfile = Lockfile::from_packages(resolved_set().iter(), "x");
    let text = lockfile.to_string_pretty().unwrap();
    let packages = Lockfile::from_str(&text).unwrap().to_packages().unwrap();

    let requests = packages.iter().find(|p| p.name() == "requests").unwrap();
    assert_eq!(requests.version(), &Version::parse("2.18.4").unwrap());
    assert_eq!(requests.files.len(), 1);
    assert_eq!(requests.requires.len(), 1);
    assert_eq!(requests.requires[0].name, "idna");
}

#[test]
fn malformed_lockfile_is_rejected() {
    assert!(Lockfile::from_str("this is not toml [").is_err());
    let dir = tempfile::tempdir().unwrap();
    assert!(Lockfile::from_path(&dir.path().join("missing.lock")).is_err());
}
