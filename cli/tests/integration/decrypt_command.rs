//! `decrypt` against a tree sealed through the library.

#![allow(clippy::expect_used)]

use datastack_cli::domain::EncryptionKey;
use datastack_cli::infra::encryption::EncryptionService;
use predicates::prelude::*;

use crate::cli_tests::datastack;

#[test]
fn test_decrypt_restores_a_sealed_tree() {
    let work = tempfile::tempdir().expect("tempdir");
    let record = tempfile::tempdir().expect("tempdir");
    std::fs::write(record.path().join("values.yaml"), "replicas: 2\n").expect("write");
    let key = EncryptionKey::generate();
    EncryptionService
        .encrypt_tree(record.path(), &key)
        .expect("encrypt");
    assert!(!record.path().join("values.yaml").exists());

    datastack(work.path())
        .arg("decrypt")
        .arg(record.path())
        .env("DATASTACK_ARTIFACT_KEY", key.to_base64())
        .assert()
        .success();

    assert_eq!(
        std::fs::read_to_string(record.path().join("values.yaml")).expect("read"),
        "replicas: 2\n"
    );
}

#[test]
fn test_decrypt_with_wrong_key_fails() {
    let work = tempfile::tempdir().expect("tempdir");
    let record = tempfile::tempdir().expect("tempdir");
    std::fs::write(record.path().join("values.yaml"), "replicas: 2\n").expect("write");
    EncryptionService
        .encrypt_tree(record.path(), &EncryptionKey::generate())
        .expect("encrypt");

    datastack(work.path())
        .arg("decrypt")
        .arg(record.path())
        .env("DATASTACK_ARTIFACT_KEY", EncryptionKey::generate().to_base64())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("decrypting"));
}

#[test]
fn test_decrypt_without_key_in_non_interactive_mode() {
    let work = tempfile::tempdir().expect("tempdir");
    let record = tempfile::tempdir().expect("tempdir");
    datastack(work.path())
        .args(["--yes", "decrypt"])
        .arg(record.path())
        .env_remove("DATASTACK_ARTIFACT_KEY")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("DATASTACK_ARTIFACT_KEY is not set"));
}

#[test]
fn test_decrypt_rejects_a_file_path() {
    let work = tempfile::tempdir().expect("tempdir");
    let file = work.path().join("not-a-dir");
    std::fs::write(&file, "x").expect("write");
    datastack(work.path())
        .arg("decrypt")
        .arg(&file)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("is not a directory"));
}
