use pyrite_util::hash::{md5_bytes, sha256_bytes, sha256_file};

#[test]
fn sha256_of_known_input() {
    assert_eq!(
        sha256_bytes(b"hello"),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
}

#[test]
fn md5_of_known_input() {
    assert_eq!(md5_bytes(b"hello"), "5d41402abc4b2a76b9719d911017c592");
}

#[test]
fn file_and_bytes_agree() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("artifact.whl");
    std::fs::write(&path, b"wheel bytes").unwrap();
    assert_eq!(sha256_file(&path).unwrap(), sha256_bytes(b"wheel bytes"));
}

#[test]
fn missing_file_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(sha256_file(&dir.path().join("missing")).is_err());
}
