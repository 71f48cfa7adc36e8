//! `SecretsManager` over in-memory and unreachable backends.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use datastack_cli::application::services::secrets::SecretsManager;
use datastack_cli::deployers::PLATFORM_SECRETS;
use datastack_cli::domain::{SecretSpec, classify};
use datastack_common::secret_paths::secret_path;

use crate::mocks::{MemoryVault, UnreachableVault};

fn manager<V: datastack_cli::application::ports::VaultBackend>(
    vault: V,
    dry_run: bool,
    dir: &std::path::Path,
) -> SecretsManager<V> {
    SecretsManager::new(vault, "acme", dry_run, dir.join("secrets.dry-run.json"))
}

#[tokio::test]
async fn existing_values_are_never_rotated() {
    let dir = tempfile::tempdir().unwrap();
    let existing = secret_path("acme", "postgres", "admin-password");
    let mgr = manager(MemoryVault::with(&existing, "keep-me"), false, dir.path());

    let bundle = mgr.ensure(PLATFORM_SECRETS).await.unwrap();

    assert_eq!(bundle.get(&existing).unwrap().value.expose(), "keep-me");
    assert!(!mgr.backend().puts().contains(&existing));
    assert_eq!(mgr.backend().value(&existing).as_deref(), Some("keep-me"));
}

#[tokio::test]
async fn second_ensure_generates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(MemoryVault::default(), false, dir.path());

    mgr.ensure(PLATFORM_SECRETS).await.unwrap();
    let first = mgr.backend().puts().len();
    let again = mgr.ensure(PLATFORM_SECRETS).await.unwrap();

    assert_eq!(mgr.backend().puts().len(), first);
    assert_eq!(again.len(), first);
}

#[tokio::test]
async fn generated_passwords_follow_their_spec() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(MemoryVault::default(), false, dir.path());
    let specs = [SecretSpec::password("superset", "db-password", 32)];

    mgr.ensure(&specs).await.unwrap();

    let value = mgr
        .backend()
        .value(&secret_path("acme", "superset", "db-password"))
        .unwrap();
    assert_eq!(value.len(), 32);
}

#[tokio::test]
async fn unreachable_backend_is_classified() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(UnreachableVault, false, dir.path());

    let err = mgr.ensure(PLATFORM_SECRETS).await.unwrap_err();
    assert_eq!(classify(&err).map(|e| e.code()), Some("backend_unavailable"));
}

#[tokio::test]
async fn dry_run_never_touches_an_unreachable_backend() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(UnreachableVault, true, dir.path());

    mgr.ensure(PLATFORM_SECRETS).await.unwrap();
    let path = secret_path("acme", "airflow", "db-password");
    assert!(mgr.fetch(&path).await.unwrap().is_placeholder());
    assert!(dir.path().join("secrets.dry-run.json").exists());
}

#[tokio::test]
async fn missing_secret_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(MemoryVault::default(), false, dir.path());

    let err = mgr
        .fetch(&secret_path("acme", "airflow", "dags-deploy-key-pub"))
        .await
        .unwrap_err();
    assert_eq!(classify(&err).map(|e| e.code()), Some("configuration_error"));
}
