//! Artifact tree encryption against a real temp directory.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;

use datastack_cli::domain::EncryptionKey;
use datastack_cli::domain::crypto::is_encrypted;
use datastack_cli::infra::encryption::EncryptionService;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn sample_tree(root: &Path) {
    write(root, "01-infrastructure/cluster/main.tf", "resource \"x\" {}\n");
    write(root, "05-data-services/airflow/values.yaml", "executor: KubernetesExecutor\n");
    write(root, "README.md", "# record\n");
    write(root, "empty.txt", "");
}

#[test]
fn tree_round_trips_with_the_same_key() {
    let dir = tempfile::tempdir().unwrap();
    sample_tree(dir.path());
    let key = EncryptionKey::generate();

    let tree = EncryptionService.encrypt_tree(dir.path(), &key).unwrap();
    assert_eq!(tree.artifacts.len(), 2);
    assert_eq!(tree.skipped.len(), 2);
    let sealed = dir.path().join("05-data-services/airflow/values.yaml.enc");
    assert!(is_encrypted(&std::fs::read(&sealed).unwrap()));
    assert!(!dir.path().join("05-data-services/airflow/values.yaml").exists());
    assert!(dir.path().join("README.md").exists());

    let restored = EncryptionService.decrypt_tree(dir.path(), &key).unwrap();
    assert_eq!(restored.len(), 2);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("05-data-services/airflow/values.yaml")).unwrap(),
        "executor: KubernetesExecutor\n"
    );
    assert!(!sealed.exists());
}

#[test]
fn wrong_key_fails_authentication() {
    let dir = tempfile::tempdir().unwrap();
    sample_tree(dir.path());
    EncryptionService
        .encrypt_tree(dir.path(), &EncryptionKey::generate())
        .unwrap();

    assert!(
        EncryptionService
            .decrypt_tree(dir.path(), &EncryptionKey::generate())
            .is_err()
    );
}

#[test]
fn encrypting_twice_does_not_double_wrap() {
    let dir = tempfile::tempdir().unwrap();
    sample_tree(dir.path());
    let key = EncryptionKey::generate();
    EncryptionService.encrypt_tree(dir.path(), &key).unwrap();

    let second = EncryptionService.encrypt_tree(dir.path(), &key).unwrap();
    assert!(second.artifacts.is_empty());
    assert!(second.skipped.iter().any(|s| s.reason == "already encrypted"));
}

#[test]
fn key_base64_round_trip_keeps_fingerprint() {
    let key = EncryptionKey::generate();
    let parsed = EncryptionKey::from_base64(&key.to_base64()).unwrap();
    assert_eq!(parsed.fingerprint(), key.fingerprint());
    assert!(!format!("{key:?}").contains(&key.to_base64()));
    assert!(EncryptionKey::from_base64("c2hvcnQ=").is_err());
}

#[test]
fn sibling_named_like_the_ciphertext_stops_encryption_untouched() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "notes", "first secret\n");
    write(dir.path(), "notes.enc", "second secret\n");
    write(dir.path(), "a/values.yaml", "replicas: 2\n");

    let err = EncryptionService
        .encrypt_tree(dir.path(), &EncryptionKey::generate())
        .unwrap_err();

    assert!(err.to_string().contains("notes and notes.enc both exist"), "{err}");
    assert_eq!(std::fs::read_to_string(dir.path().join("notes")).unwrap(), "first secret\n");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("notes.enc")).unwrap(),
        "second secret\n"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("a/values.yaml")).unwrap(),
        "replicas: 2\n"
    );
}

#[test]
fn decrypt_refuses_to_replace_an_existing_plaintext() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "values.yaml", "replicas: 2\n");
    let key = EncryptionKey::generate();
    EncryptionService.encrypt_tree(dir.path(), &key).unwrap();
    write(dir.path(), "values.yaml", "edited by hand\n");

    assert!(EncryptionService.decrypt_tree(dir.path(), &key).is_err());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("values.yaml")).unwrap(),
        "edited by hand\n"
    );
    assert!(dir.path().join("values.yaml.enc").exists());
}
