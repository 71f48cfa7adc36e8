//! Deployable units.
//!
//! Every unit is a row in the static [`registry::REGISTRY`] table: a phase,
//! a declared order, a service id, and one of a handful of kinds. The kinds
//! hold all behaviour; units carry only data.

mod bundle;
mod helm;
mod manifest;
pub mod registry;
mod repository;
mod secrets;
mod terraform;
mod tunnel;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use datastack_common::{PhaseId, ServiceId};

use crate::application::deployer::{DeployContext, Deployer};
use crate::application::ports::{CommandExecutor, VaultBackend};
use crate::domain::{PlatformConfig, ServiceResult};

pub use helm::{HelmRelease, HelmRepo};
pub use registry::{REGISTRY, registry, validate_chart_overrides};
pub use repository::{RepoMode, RepoRemote, RepositoryUnit};
pub use secrets::{PLATFORM_SECRETS, SecretsUnit};
pub use terraform::{TerraformOutput, TerraformStack};

/// Whether a unit takes part in a deployment with the given config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Always,
    /// Only when secrets live in a vault deployed into the cluster.
    InClusterVault,
}

/// What a unit is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitKind {
    Terraform(TerraformStack),
    Helm(HelmRelease),
    /// Plain Kubernetes manifests applied with kubectl.
    Manifest { namespace: &'static str },
    Secrets(SecretsUnit),
    Repository(RepositoryUnit),
    /// Encrypted deployment record pushed to git.
    ArtifactBundle,
}

/// One row of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub phase: PhaseId,
    pub order: u8,
    pub service: &'static str,
    pub when: Condition,
    pub kind: UnitKind,
}

impl Unit {
    #[must_use]
    pub fn is_enabled(&self, config: &PlatformConfig) -> bool {
        match self.when {
            Condition::Always => true,
            Condition::InClusterVault => config.vault.is_in_cluster(),
        }
    }

    /// Kubernetes namespace the unit deploys into, if it deploys into one.
    #[must_use]
    pub fn namespace(&self) -> Option<&'static str> {
        match &self.kind {
            UnitKind::Helm(release) => Some(release.namespace),
            UnitKind::Manifest { namespace } => Some(namespace),
            _ => None,
        }
    }

    fn service_id(&self) -> Result<ServiceId> {
        ServiceId::new(self.service).with_context(|| format!("registry entry '{}'", self.service))
    }

    fn out_dir<E: CommandExecutor, V: VaultBackend>(
        &self,
        ctx: &DeployContext<'_, E, V>,
    ) -> Result<PathBuf> {
        Ok(ctx.layout.service_dir(self.phase, &self.service_id()?))
    }

    /// Template context: the config view plus unit-specific keys.
    fn values(&self, config: &PlatformConfig) -> BTreeMap<String, String> {
        let mut values = config.template_values();
        values.insert("service".into(), self.service.to_string());
        values.insert("phase".into(), self.phase.name().to_string());
        values.insert("secret_name".into(), secrets::k8s_secret_name(self.service));
        if let Some(namespace) = self.namespace() {
            values.insert("namespace".into(), namespace.to_string());
        }
        if let Some(version) = self.chart_version(config) {
            values.insert("chart_version".into(), version);
        }
        values
    }

    fn disabled_result(&self) -> ServiceResult {
        let mut result = ServiceResult::default();
        result.ok(format!("{}: not used with the configured vault backend", self.service));
        result
    }
}

impl Deployer for Unit {
    fn service(&self) -> &str {
        self.service
    }

    fn phase(&self) -> PhaseId {
        self.phase
    }

    fn order(&self) -> u8 {
        self.order
    }

    fn chart_version(&self, config: &PlatformConfig) -> Option<String> {
        match &self.kind {
            UnitKind::Helm(release) => Some(
                config
                    .charts
                    .get(self.service)
                    .cloned()
                    .unwrap_or_else(|| release.version.to_string()),
            ),
            _ => None,
        }
    }

    fn render<E: CommandExecutor, V: VaultBackend>(
        &self,
        ctx: &DeployContext<'_, E, V>,
    ) -> Result<Vec<PathBuf>> {
        if !self.is_enabled(ctx.config) {
            return Ok(Vec::new());
        }
        let out_dir = self.out_dir(ctx)?;
        let mut paths = ctx
            .renderer
            .render_dir(self.service, &self.values(ctx.config), &out_dir)?;
        if let UnitKind::Secrets(unit) = &self.kind {
            paths.push(secrets::render_index(unit, ctx, &out_dir)?);
        }
        Ok(paths)
    }

    async fn apply<E: CommandExecutor, V: VaultBackend>(
        &self,
        ctx: &DeployContext<'_, E, V>,
        artifacts: &[PathBuf],
    ) -> Result<ServiceResult> {
        if !self.is_enabled(ctx.config) {
            return Ok(self.disabled_result());
        }
        match &self.kind {
            UnitKind::Terraform(stack) => terraform::apply(stack, ctx, &self.out_dir(ctx)?).await,
            UnitKind::Helm(release) => {
                let version = self.chart_version(ctx.config).unwrap_or_default();
                helm::apply(self.service, release, &version, ctx, artifacts).await
            }
            UnitKind::Manifest { .. } => manifest::apply(ctx, artifacts).await,
            UnitKind::Secrets(unit) => secrets::apply(unit, ctx).await,
            UnitKind::Repository(unit) => {
                repository::apply(unit, ctx, &self.out_dir(ctx)?).await
            }
            UnitKind::ArtifactBundle => bundle::apply(ctx).await,
        }
    }

    async fn destroy<E: CommandExecutor, V: VaultBackend>(
        &self,
        ctx: &DeployContext<'_, E, V>,
    ) -> Result<ServiceResult> {
        if !self.is_enabled(ctx.config) {
            return Ok(self.disabled_result());
        }
        let artifacts = self.render(ctx)?;
        match &self.kind {
            UnitKind::Terraform(_) => terraform::destroy(ctx, &self.out_dir(ctx)?).await,
            UnitKind::Helm(release) => helm::destroy(self.service, release, ctx, &artifacts).await,
            UnitKind::Manifest { .. } => manifest::destroy(ctx, &artifacts).await,
            UnitKind::Secrets(unit) => secrets::destroy(unit, ctx).await,
            UnitKind::Repository(unit) => repository::destroy(unit, ctx),
            UnitKind::ArtifactBundle => bundle::destroy(ctx),
        }
    }
}

// ── Shared command builders ──────────────────────────────────────────────────

/// `kubectl --kubeconfig <staging kubeconfig> <args>`
fn kubectl<E: CommandExecutor, V: VaultBackend>(
    ctx: &DeployContext<'_, E, V>,
) -> crate::domain::CommandSpec {
    crate::domain::CommandSpec::new("kubectl")
        .arg("--kubeconfig")
        .arg(path_arg(&ctx.kubeconfig()))
        .timeout(std::time::Duration::from_secs(ctx.config.timeouts.command_secs))
}

fn path_arg(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}
