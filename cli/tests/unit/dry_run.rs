//! End-to-end runs over the real unit registry: dry-run purity, artifact
//! parity between dry and real runs, and render idempotence.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;

use datastack_cli::application::Deployer;
use datastack_cli::application::ports::CommandExecutor;
use datastack_cli::application::services::deployment::DeploymentManager;
use datastack_cli::deployers::REGISTRY;
use datastack_common::{DeploymentState, secret_paths};

use crate::helpers::{Fixture, external_config, sample_config};
use crate::mocks::{MemoryStateStore, SpyRunner, UnreachableRunner};

fn artifact_paths(state: &DeploymentState) -> BTreeSet<String> {
    state
        .phases
        .values()
        .flat_map(|p| p.services.values())
        .flat_map(|s| s.rendered_artifact_paths.iter().cloned())
        .collect()
}

#[tokio::test]
async fn dry_run_completes_every_unit_without_running_anything() {
    let fx = Fixture::new(sample_config(), UnreachableRunner, true);
    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);
    let store = MemoryStateStore::default();
    let cancel = AtomicBool::new(false);
    let manager = DeploymentManager::new(&store, &ctx, REGISTRY, &cancel);

    let result = manager.run(&BTreeSet::new(), false).await.unwrap();

    assert!(result.is_success(), "{:?}", result.failed);
    assert!(result.dry_run);
    assert_eq!(result.completed.len(), REGISTRY.len());

    let journal = manager.journal();
    assert!(!journal.is_empty());
    assert!(journal.iter().all(|r| r.dry_run && r.exit_code.is_none()));

    assert!(fx.secrets.backend().puts().is_empty());
    assert!(fx.layout.secrets_inspection_file().exists());
    assert!(store.current().unwrap().dry_run);
}

#[tokio::test]
async fn dry_run_leaves_real_credentials_and_clones_alone() {
    let fx = Fixture::new(sample_config(), UnreachableRunner, true);
    let kubeconfig = fx.layout.kubeconfig(false);
    std::fs::create_dir_all(kubeconfig.parent().unwrap()).unwrap();
    std::fs::write(&kubeconfig, "REAL-KUBECONFIG").unwrap();
    let gitops = fx.layout.repo_dir("gitops", false);
    std::fs::create_dir_all(gitops.join(".git")).unwrap();
    std::fs::write(gitops.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
    std::fs::write(gitops.join("README.md"), "gitops").unwrap();

    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);
    let store = MemoryStateStore::default();
    let cancel = AtomicBool::new(false);
    let manager = DeploymentManager::new(&store, &ctx, REGISTRY, &cancel);
    let deployed = manager.run(&BTreeSet::new(), false).await.unwrap();
    let destroyed = manager.destroy(&BTreeSet::new()).await.unwrap();

    assert!(deployed.is_success(), "{:?}", deployed.failed);
    assert!(destroyed.is_success(), "{:?}", destroyed.failed);
    assert_eq!(std::fs::read_to_string(&kubeconfig).unwrap(), "REAL-KUBECONFIG");
    assert!(gitops.join(".git/HEAD").exists());
    assert_eq!(std::fs::read_to_string(gitops.join("README.md")).unwrap(), "gitops");
    assert!(fx.layout.kubeconfig(true).exists());
    assert!(
        manager
            .journal()
            .iter()
            .filter(|r| r.command.starts_with("kubectl") || r.command.starts_with("helm"))
            .all(|r| !r.command.contains(&kubeconfig.to_string_lossy().into_owned()))
    );
}

#[tokio::test]
async fn dry_run_renders_the_same_artifacts_as_a_real_run() {
    let cancel = AtomicBool::new(false);

    let dry = Fixture::new(external_config(), UnreachableRunner, true);
    let dry_renderer = dry.renderer();
    let dry_ctx = dry.ctx(&dry_renderer);
    let dry_store = MemoryStateStore::default();
    let dry_result = DeploymentManager::new(&dry_store, &dry_ctx, REGISTRY, &cancel)
        .run(&BTreeSet::new(), false)
        .await
        .unwrap();

    let real = Fixture::new(external_config(), SpyRunner::default(), false);
    let real_renderer = real.renderer();
    let real_ctx = real.ctx(&real_renderer);
    let real_store = MemoryStateStore::default();
    let real_result = DeploymentManager::new(&real_store, &real_ctx, REGISTRY, &cancel)
        .run(&BTreeSet::new(), false)
        .await
        .unwrap();

    assert!(dry_result.is_success(), "{:?}", dry_result.failed);
    assert!(real_result.is_success(), "{:?}", real_result.failed);

    let dry_paths = artifact_paths(&dry_store.current().unwrap());
    let real_paths = artifact_paths(&real_store.current().unwrap());
    assert!(!dry_paths.is_empty());
    assert_eq!(dry_paths, real_paths);

    assert!(dry.executor.journal().iter().all(|r| r.dry_run));
    let real_journal = real.executor.journal();
    assert_eq!(real_journal.len(), real.executor.runner().calls().len());
    assert!(real_journal.iter().all(|r| !r.dry_run));

    let key_path = secret_paths::encryption_key_path("acme");
    assert!(real.secrets.backend().value(&key_path).is_some());
    assert!(dry.secrets.backend().value(&key_path).is_none());
    assert!(
        real.reporter
            .events()
            .iter()
            .any(|e| e.starts_with("reveal:"))
    );
}

#[tokio::test]
async fn real_run_applies_platform_secrets_over_stdin_only() {
    let fx = Fixture::new(external_config(), SpyRunner::default(), false);
    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);
    let store = MemoryStateStore::default();
    let cancel = AtomicBool::new(false);
    let manager = DeploymentManager::new(&store, &ctx, REGISTRY, &cancel);

    manager.run(&BTreeSet::new(), false).await.unwrap();

    let stored = fx.secrets.backend().puts();
    let password = secret_paths::secret_path("acme", "airflow", "db-password");
    assert!(stored.contains(&password));
    let value = fx.secrets.backend().value(&password).unwrap();
    assert!(
        !manager
            .journal()
            .iter()
            .any(|r| r.command.contains(&value)),
        "secret values must never appear on a command line"
    );
}

#[test]
fn rendering_is_deterministic_and_prunes_stale_files() {
    let fx = Fixture::new(sample_config(), UnreachableRunner, true);
    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);

    for unit in REGISTRY {
        let first = unit.render(&ctx).unwrap();
        let contents: Vec<Vec<u8>> = first.iter().map(|p| std::fs::read(p).unwrap()).collect();
        let second = unit.render(&ctx).unwrap();
        assert_eq!(first, second, "{} paths changed", unit.service);
        for (path, before) in second.iter().zip(&contents) {
            assert_eq!(&std::fs::read(path).unwrap(), before, "{}", path.display());
        }
        for path in &second {
            let text = std::fs::read_to_string(path).unwrap();
            assert!(!text.contains("{{"), "unrendered placeholder in {}", path.display());
        }
    }

    let airflow = REGISTRY.iter().find(|u| u.service == "airflow").unwrap();
    let rendered = airflow.render(&ctx).unwrap();
    let stale = rendered[0].with_file_name("old-values.yaml");
    std::fs::write(&stale, "stale").unwrap();
    airflow.render(&ctx).unwrap();
    assert!(!stale.exists());
}

#[test]
fn in_cluster_vault_unit_is_skipped_with_an_external_backend() {
    let fx = Fixture::new(external_config(), UnreachableRunner, true);
    let renderer = fx.renderer();
    let ctx = fx.ctx(&renderer);
    let vault = REGISTRY.iter().find(|u| u.service == "vault").unwrap();
    assert!(vault.render(&ctx).unwrap().is_empty());
    assert!(ctx.executor.is_dry_run());
}
