//! The uniform interface every deployable unit presents to the orchestrator.

use std::path::PathBuf;

use anyhow::Result;
use datastack_common::PhaseId;

use crate::application::ports::{CommandExecutor, ProgressReporter, VaultBackend};
use crate::application::renderer::TemplateRenderer;
use crate::application::services::secrets::SecretsManager;
use crate::domain::{ArtifactLayout, PlatformConfig, ServiceResult};

/// Everything a deployer may use, passed explicitly by reference.
///
/// Deployers never branch on dry-run themselves: commands go through
/// `executor`, secrets through `secrets`, and both already know the mode.
/// Local paths that differ per mode come from the helpers below.
pub struct DeployContext<'a, E: CommandExecutor, V: VaultBackend> {
    pub config: &'a PlatformConfig,
    pub layout: &'a ArtifactLayout,
    pub executor: &'a E,
    pub secrets: &'a SecretsManager<V>,
    pub renderer: &'a TemplateRenderer<'a>,
    pub reporter: &'a dyn ProgressReporter,
}

impl<E: CommandExecutor, V: VaultBackend> DeployContext<'_, E, V> {
    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.executor.is_dry_run()
    }

    /// Staging directory of the current mode.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.layout.staging_dir(self.dry_run())
    }

    #[must_use]
    pub fn kubeconfig(&self) -> PathBuf {
        self.layout.kubeconfig(self.dry_run())
    }

    /// Working copy of a remote for the current mode.
    #[must_use]
    pub fn repo_dir(&self, name: &str) -> PathBuf {
        self.layout.repo_dir(name, self.dry_run())
    }
}

/// A deployable unit.
#[allow(async_fn_in_trait)]
pub trait Deployer {
    /// Service id, unique across all phases.
    fn service(&self) -> &str;

    /// Phase the unit belongs to.
    fn phase(&self) -> PhaseId;

    /// Position within the phase; lower runs first.
    fn order(&self) -> u8;

    /// Upstream chart version this unit deploys, if any.
    fn chart_version(&self, _config: &PlatformConfig) -> Option<String> {
        None
    }

    /// Write this unit's artifacts. Deterministic and identical in both modes.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Configuration` when inputs are missing or invalid.
    fn render<E: CommandExecutor, V: VaultBackend>(
        &self,
        ctx: &DeployContext<'_, E, V>,
    ) -> Result<Vec<PathBuf>>;

    /// Push rendered artifacts to their target system.
    ///
    /// # Errors
    ///
    /// Returns the first command or backend failure; nothing is retried.
    async fn apply<E: CommandExecutor, V: VaultBackend>(
        &self,
        ctx: &DeployContext<'_, E, V>,
        artifacts: &[PathBuf],
    ) -> Result<ServiceResult>;

    /// Tear down what `apply` created. Units re-render first when their
    /// tools need artifacts on disk.
    async fn destroy<E: CommandExecutor, V: VaultBackend>(
        &self,
        ctx: &DeployContext<'_, E, V>,
    ) -> Result<ServiceResult>;
}
