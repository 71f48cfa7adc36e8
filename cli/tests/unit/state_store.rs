//! `JsonStateStore` against a real temp directory.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use datastack_cli::application::ports::StateStore;
use datastack_cli::domain::classify;
use datastack_cli::infra::state::JsonStateStore;
use datastack_common::{CloudProvider, DeploymentState, PhaseId, ServiceId, ServiceStatus};

fn completed_state() -> DeploymentState {
    let mut state = DeploymentState::new("acme", CloudProvider::Azure, false);
    let svc = state
        .phase_mut(PhaseId::Secrets)
        .service_mut(&ServiceId::new("platform-secrets").unwrap());
    svc.transition_to(ServiceStatus::Rendering).unwrap();
    svc.transition_to(ServiceStatus::Applying).unwrap();
    svc.transition_to(ServiceStatus::Completed).unwrap();
    state
}

#[tokio::test]
async fn save_leaves_no_temp_files_behind() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path().join("state.json"));

    store.save(&completed_state()).await.unwrap();
    store.save(&completed_state()).await.unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["state.json".to_string()]);
}

#[tokio::test]
async fn completed_services_survive_a_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.json");
    JsonStateStore::new(&path)
        .save(&completed_state())
        .await
        .unwrap();

    let reopened = JsonStateStore::new(&path);
    let id = ServiceId::new("platform-secrets").unwrap();
    assert!(reopened.is_service_done(PhaseId::Secrets, &id).await.unwrap());
    assert!(
        !reopened
            .is_service_done(PhaseId::Finalize, &ServiceId::new("summary").unwrap())
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn truncated_file_is_reported_as_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, r#"{"customer": "acme", "phases": {"#).unwrap();

    let err = JsonStateStore::new(&path).load().await.unwrap_err();
    assert_eq!(classify(&err).map(|e| e.code()), Some("state_corruption"));
}

#[tokio::test]
async fn unknown_status_is_reported_as_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = JsonStateStore::new(&path);
    store.save(&completed_state()).await.unwrap();
    let tampered = std::fs::read_to_string(&path)
        .unwrap()
        .replace("\"completed\"", "\"exploded\"");
    std::fs::write(&path, tampered).unwrap();

    let err = store.load().await.unwrap_err();
    assert_eq!(classify(&err).map(|e| e.code()), Some("state_corruption"));
}

#[tokio::test]
async fn clear_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path().join("state.json"));
    store.save(&completed_state()).await.unwrap();
    store.clear().await.unwrap();
    store.clear().await.unwrap();
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn load_sweeps_temp_files_left_by_a_killed_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = JsonStateStore::new(&path);
    store.save(&completed_state()).await.unwrap();
    let stale = dir.path().join(".state.json-a1b2c3.tmp");
    std::fs::write(&stale, "{ half written").unwrap();
    let other_mode = dir.path().join(".state.dry-run.json-d4e5f6.tmp");
    std::fs::write(&other_mode, "{").unwrap();

    assert!(store.load().await.unwrap().is_some());
    assert!(!stale.exists());
    assert!(other_mode.exists(), "only this state file's temp files are swept");
    assert!(path.exists());
}
