//! Shared test helpers: sample configs, process output constructors, and a
//! fixture that owns everything a `DeployContext` borrows.

#![allow(clippy::expect_used, dead_code)]

use std::process::{ExitStatus, Output};

use datastack_cli::application::ports::{CommandRunner, VaultBackend};
use datastack_cli::application::{DeployContext, Executor, TemplateRenderer};
use datastack_cli::application::services::secrets::SecretsManager;
use datastack_cli::assets::TEMPLATES;
use datastack_cli::domain::{ArtifactLayout, PlatformConfig};
use datastack_cli::infra::fs::LocalFs;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::TempDir;

use crate::mocks::{MemoryVault, RecordingReporter};

// ── Configs ──────────────────────────────────────────────────────────────────

pub const SAMPLE_YAML: &str = "\
customer: acme
cloud_provider: aws
region: eu-west-1
domain: data.acme.example
vault:
  backend: in_cluster
  token_env: VAULT_TOKEN
repositories:
  gitops_url: git@github.com:acme/gitops.git
  dags_url: https://github.com/acme/dags.git
  artifacts_url: git@github.com:acme/deploy-record.git
";

/// In-cluster vault, reached through a port-forward.
pub fn sample_config() -> PlatformConfig {
    serde_yaml::from_str(SAMPLE_YAML).expect("valid sample config")
}

/// External secrets service; no port-forward is ever opened.
pub fn external_config() -> PlatformConfig {
    let yaml = SAMPLE_YAML.replace(
        "  backend: in_cluster\n  token_env: VAULT_TOKEN\n",
        "  backend: external\n  api_url: https://secrets.example.com\n  client_id_env: SECRETS_CLIENT_ID\n  client_secret_env: SECRETS_CLIENT_SECRET\n  project_id: p-123\n  environment: prod\n",
    );
    serde_yaml::from_str(&yaml).expect("valid external config")
}

// ── Cross-platform ExitStatus construction ───────────────────────────────────

/// Build an `ExitStatus` from a logical exit code (0 = success, non-zero = failure).
///
/// On Unix the raw wait-status encodes the exit code in bits 8–15, so we shift.
#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    #[allow(clippy::cast_sign_loss)]
    ExitStatus::from_raw(code as u32)
}

pub fn ok_output(stdout: &[u8]) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.to_vec(),
        stderr: Vec::new(),
    }
}

pub fn err_output(code: i32, stderr: &[u8]) -> Output {
    Output {
        status: exit_status(code),
        stdout: Vec::new(),
        stderr: stderr.to_vec(),
    }
}

// ── Fixture ──────────────────────────────────────────────────────────────────

/// Owns a temp workdir and every collaborator of a deploy run.
pub struct Fixture<R: CommandRunner, V: VaultBackend = MemoryVault> {
    pub dir: TempDir,
    pub config: PlatformConfig,
    pub layout: ArtifactLayout,
    pub executor: Executor<R>,
    pub secrets: SecretsManager<V>,
    pub reporter: RecordingReporter,
    pub fs: LocalFs,
}

impl<R: CommandRunner> Fixture<R, MemoryVault> {
    pub fn new(config: PlatformConfig, runner: R, dry_run: bool) -> Self {
        Self::with_vault(config, runner, MemoryVault::default(), dry_run)
    }
}

impl<R: CommandRunner, V: VaultBackend> Fixture<R, V> {
    pub fn with_vault(config: PlatformConfig, runner: R, vault: V, dry_run: bool) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = ArtifactLayout::new(dir.path());
        let secrets = SecretsManager::new(
            vault,
            config.customer.clone(),
            dry_run,
            layout.secrets_inspection_file(),
        )
        .with_rng(StdRng::seed_from_u64(7));
        Self {
            dir,
            config,
            layout,
            executor: Executor::new(runner, dry_run),
            secrets,
            reporter: RecordingReporter::default(),
            fs: LocalFs,
        }
    }

    pub fn renderer(&self) -> TemplateRenderer<'_> {
        TemplateRenderer::new(&TEMPLATES, &self.fs)
    }

    pub fn ctx<'a>(&'a self, renderer: &'a TemplateRenderer<'a>) -> DeployContext<'a, Executor<R>, V> {
        DeployContext {
            config: &self.config,
            layout: &self.layout,
            executor: &self.executor,
            secrets: &self.secrets,
            renderer,
            reporter: &self.reporter,
        }
    }
}
