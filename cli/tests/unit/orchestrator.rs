//! Phase ordering, fail-fast deploy, resume, cancellation and best-effort
//! destroy, driven through `DeploymentManager` with fake units.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;

use datastack_cli::application::services::deployment::DeploymentManager;
use datastack_cli::domain::classify;
use datastack_common::{CloudProvider, DeploymentState, PhaseId, ServiceId, ServiceStatus};

use crate::helpers::{Fixture, sample_config};
use crate::mocks::{FakeUnit, MemoryStateStore, SpyRunner, ordered, unit};

const UNITS: &[FakeUnit] = &[
    unit(PhaseId::Infrastructure, "network"),
    unit(PhaseId::Infrastructure, "cluster"),
    unit(PhaseId::Secrets, "alpha"),
    unit(PhaseId::Secrets, "beta"),
];

fn phases(ids: &[PhaseId]) -> BTreeSet<PhaseId> {
    ids.iter().copied().collect()
}

fn id(s: &str) -> ServiceId {
    ServiceId::new(s).unwrap()
}

fn status(state: &DeploymentState, phase: PhaseId, service: &str) -> Option<ServiceStatus> {
    state.service(phase, &id(service)).map(|s| s.status)
}

// ── Deploy ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_service_halts_the_run() {
    let fx = Fixture::new(sample_config(), SpyRunner::failing_on("apply alpha"), false);
    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);
    let store = MemoryStateStore::default();
    let cancel = AtomicBool::new(false);
    let manager = DeploymentManager::new(&store, &ctx, UNITS, &cancel);

    let result = manager
        .run(&phases(&[PhaseId::Infrastructure, PhaseId::Secrets]), false)
        .await
        .unwrap();

    assert!(result.was_completed(PhaseId::Infrastructure, "network"));
    assert!(result.was_completed(PhaseId::Infrastructure, "cluster"));
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].service.as_str(), "alpha");
    assert_eq!(result.failed[0].code, Some("command_failed"));
    assert_eq!(
        result.failed[0].command.as_deref(),
        Some("tool apply alpha")
    );
    assert_eq!(result.not_attempted.len(), 1);
    assert_eq!(result.not_attempted[0].service.as_str(), "beta");
    assert_ne!(result.exit_code(), 0);

    assert!(!fx.executor.runner().calls().iter().any(|c| c.contains("beta")));

    let state = store.current().unwrap();
    assert!(state.phases[&PhaseId::Infrastructure].completed_at.is_some());
    assert_eq!(
        status(&state, PhaseId::Secrets, "alpha"),
        Some(ServiceStatus::Failed)
    );
    let alpha = state.service(PhaseId::Secrets, &id("alpha")).unwrap();
    assert!(alpha.last_error.as_deref().unwrap().contains("simulated failure"));
    assert_ne!(
        status(&state, PhaseId::Secrets, "beta"),
        Some(ServiceStatus::Completed)
    );
}

#[tokio::test]
async fn services_run_in_declared_order() {
    let fx = Fixture::new(sample_config(), SpyRunner::default(), false);
    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);
    let store = MemoryStateStore::default();
    let cancel = AtomicBool::new(false);
    let manager = DeploymentManager::new(&store, &ctx, UNITS, &cancel);

    let result = manager.run(&BTreeSet::new(), false).await.unwrap();

    assert!(result.is_success());
    assert_eq!(
        fx.executor.runner().calls(),
        vec![
            "tool apply network",
            "tool apply cluster",
            "tool apply alpha",
            "tool apply beta",
        ]
    );
    assert_eq!(result.resumable_completed, 4);
}

#[tokio::test]
async fn order_key_wins_over_table_position() {
    const SHUFFLED: &[FakeUnit] = &[
        ordered(PhaseId::Secrets, 2, "beta"),
        ordered(PhaseId::Infrastructure, 2, "cluster"),
        ordered(PhaseId::Secrets, 1, "alpha"),
        ordered(PhaseId::Infrastructure, 1, "network"),
    ];
    let fx = Fixture::new(sample_config(), SpyRunner::default(), false);
    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);
    let store = MemoryStateStore::default();
    let cancel = AtomicBool::new(false);
    let manager = DeploymentManager::new(&store, &ctx, SHUFFLED, &cancel);

    manager.run(&BTreeSet::new(), false).await.unwrap();
    assert_eq!(
        fx.executor.runner().calls(),
        vec![
            "tool apply network",
            "tool apply cluster",
            "tool apply alpha",
            "tool apply beta",
        ]
    );

    manager.destroy(&BTreeSet::new()).await.unwrap();
    assert_eq!(
        fx.executor.runner().calls()[4..],
        [
            "tool destroy beta",
            "tool destroy alpha",
            "tool destroy cluster",
            "tool destroy network",
        ]
    );
}

#[tokio::test]
async fn every_transition_is_saved_before_moving_on() {
    let fx = Fixture::new(sample_config(), SpyRunner::default(), false);
    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);
    let store = MemoryStateStore::default();
    let cancel = AtomicBool::new(false);
    let manager = DeploymentManager::new(&store, &ctx, &UNITS[..1], &cancel);

    manager
        .run(&phases(&[PhaseId::Infrastructure]), false)
        .await
        .unwrap();

    let seen: Vec<ServiceStatus> = store
        .history()
        .iter()
        .filter_map(|s| status(s, PhaseId::Infrastructure, "network"))
        .collect();
    let mut deduped = seen.clone();
    deduped.dedup();
    assert_eq!(
        deduped,
        vec![
            ServiceStatus::Rendering,
            ServiceStatus::Applying,
            ServiceStatus::Completed
        ]
    );

    let state = store.current().unwrap();
    let network = state
        .service(PhaseId::Infrastructure, &id("network"))
        .unwrap();
    assert_eq!(
        network.rendered_artifact_paths,
        vec!["artifacts/01-infrastructure/network/unit.txt".to_string()]
    );
    assert_eq!(network.chart_version.as_deref(), Some("1.0.0"));
}

// ── Resume ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn resume_skips_completed_services() {
    let store = MemoryStateStore::default();
    let cancel = AtomicBool::new(false);
    let all = phases(&[PhaseId::Infrastructure, PhaseId::Secrets]);

    {
        let fx = Fixture::new(sample_config(), SpyRunner::failing_on("apply alpha"), false);
        let renderer = fx.renderer();
        let ctx = fx.ctx(&renderer);
        let manager = DeploymentManager::new(&store, &ctx, UNITS, &cancel);
        let first = manager.run(&all, false).await.unwrap();
        assert!(!first.is_success());
        assert_eq!(first.resumable_completed, 2);
    }

    let fx = Fixture::new(sample_config(), SpyRunner::default(), false);
    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);
    let manager = DeploymentManager::new(&store, &ctx, UNITS, &cancel);
    let second = manager.run(&all, true).await.unwrap();

    assert!(second.is_success());
    assert!(second.was_skipped(PhaseId::Infrastructure, "network"));
    assert!(second.was_skipped(PhaseId::Infrastructure, "cluster"));
    assert!(second.was_completed(PhaseId::Secrets, "alpha"));
    assert!(second.was_completed(PhaseId::Secrets, "beta"));
    assert_eq!(
        fx.executor.runner().calls(),
        vec!["tool apply alpha", "tool apply beta"]
    );
}

#[tokio::test]
async fn run_without_resume_redeploys_requested_phases() {
    let fx = Fixture::new(sample_config(), SpyRunner::default(), false);
    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);
    let store = MemoryStateStore::default();
    let cancel = AtomicBool::new(false);
    let manager = DeploymentManager::new(&store, &ctx, UNITS, &cancel);
    let infra = phases(&[PhaseId::Infrastructure]);

    manager.run(&infra, false).await.unwrap();
    let again = manager.run(&infra, false).await.unwrap();

    assert!(again.skipped.is_empty());
    assert_eq!(again.completed.len(), 2);
    assert_eq!(fx.executor.runner().calls().len(), 4);
}

#[tokio::test]
async fn gap_in_earlier_phase_is_warned_about() {
    let fx = Fixture::new(sample_config(), SpyRunner::default(), false);
    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);
    let store = MemoryStateStore::with(DeploymentState::new("acme", CloudProvider::Aws, false));
    let cancel = AtomicBool::new(false);
    let manager = DeploymentManager::new(&store, &ctx, UNITS, &cancel);

    let result = manager.run(&phases(&[PhaseId::Secrets]), false).await.unwrap();

    assert!(result.is_success());
    assert!(
        fx.reporter
            .events()
            .iter()
            .any(|e| e.starts_with("warn: phase 1 (infrastructure) is not complete"))
    );
}

#[tokio::test]
async fn state_of_another_deployment_is_rejected() {
    let fx = Fixture::new(sample_config(), SpyRunner::default(), false);
    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);
    let store = MemoryStateStore::with(DeploymentState::new("globex", CloudProvider::Aws, false));
    let cancel = AtomicBool::new(false);
    let manager = DeploymentManager::new(&store, &ctx, UNITS, &cancel);

    let err = manager.run(&BTreeSet::new(), true).await.unwrap_err();

    assert_eq!(classify(&err).map(|e| e.code()), Some("configuration_error"));
    assert!(fx.executor.runner().calls().is_empty());
}

#[tokio::test]
async fn cancellation_stops_before_the_next_service() {
    let fx = Fixture::new(sample_config(), SpyRunner::default(), false);
    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);
    let store = MemoryStateStore::default();
    let cancel = AtomicBool::new(true);
    let manager = DeploymentManager::new(&store, &ctx, UNITS, &cancel);

    let result = manager.run(&BTreeSet::new(), false).await.unwrap();

    assert!(result.interrupted);
    assert_eq!(result.not_attempted.len(), UNITS.len());
    assert_eq!(result.exit_code(), 1);
    assert!(fx.executor.runner().calls().is_empty());
}

// ── Destroy ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn destroy_runs_latest_phase_first_and_clears_state() {
    let fx = Fixture::new(sample_config(), SpyRunner::default(), false);
    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);
    let store = MemoryStateStore::default();
    let cancel = AtomicBool::new(false);
    let manager = DeploymentManager::new(&store, &ctx, UNITS, &cancel);

    manager.run(&BTreeSet::new(), false).await.unwrap();
    let result = manager.destroy(&BTreeSet::new()).await.unwrap();

    assert!(result.is_success());
    let destroys: Vec<String> = fx
        .executor
        .runner()
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("tool destroy"))
        .collect();
    assert_eq!(
        destroys,
        vec![
            "tool destroy beta",
            "tool destroy alpha",
            "tool destroy cluster",
            "tool destroy network",
        ]
    );
    assert!(store.was_cleared());
    assert!(store.current().is_none());
}

#[tokio::test]
async fn destroy_continues_past_failures() {
    let fx = Fixture::new(sample_config(), SpyRunner::failing_on("destroy cluster"), false);
    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);
    let store = MemoryStateStore::default();
    let cancel = AtomicBool::new(false);
    let manager = DeploymentManager::new(&store, &ctx, UNITS, &cancel);

    manager.run(&BTreeSet::new(), false).await.unwrap();
    let result = manager.destroy(&BTreeSet::new()).await.unwrap();

    assert_eq!(result.completed.len(), 3);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].service.as_str(), "cluster");
    assert!(
        fx.executor
            .runner()
            .calls()
            .contains(&"tool destroy network".to_string())
    );
    assert_ne!(result.exit_code(), 0);

    let state = store.current().expect("state kept after a failed destroy");
    let cluster = state
        .service(PhaseId::Infrastructure, &id("cluster"))
        .unwrap();
    assert!(cluster.last_error.as_deref().unwrap().starts_with("destroy:"));
    assert_eq!(
        status(&state, PhaseId::Infrastructure, "network"),
        Some(ServiceStatus::Pending)
    );
}

#[tokio::test]
async fn partial_destroy_keeps_other_phases() {
    let fx = Fixture::new(sample_config(), SpyRunner::default(), false);
    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);
    let store = MemoryStateStore::default();
    let cancel = AtomicBool::new(false);
    let manager = DeploymentManager::new(&store, &ctx, UNITS, &cancel);

    manager.run(&BTreeSet::new(), false).await.unwrap();
    manager.destroy(&phases(&[PhaseId::Secrets])).await.unwrap();

    let state = store.current().unwrap();
    assert!(!store.was_cleared());
    assert!(state.is_service_done(PhaseId::Infrastructure, &id("network")));
    assert!(!state.phases.contains_key(&PhaseId::Secrets));
}
