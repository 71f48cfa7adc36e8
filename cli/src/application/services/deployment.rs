//! Deployment manager: the run and destroy use-cases.
//!
//! Resolves which phases to touch, warns about gaps in earlier phases, and
//! delegates the per-service work to [`PhaseOrchestrator`]. Dry-run is decided
//! by the executor inside the context, never here.

use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use datastack_common::{DeploymentState, PhaseId, ServiceId, ServiceStatus};

use crate::application::deployer::{DeployContext, Deployer};
use crate::application::ports::{CommandExecutor, StateStore, VaultBackend};
use crate::application::services::orchestrator::PhaseOrchestrator;
use crate::domain::{DeploymentResult, ExecRecord, PhaseStatusView, ServiceStatusView, StatusView};

/// Entry point for deploy and destroy runs.
pub struct DeploymentManager<'a, S, E, V, D>
where
    S: StateStore,
    E: CommandExecutor,
    V: VaultBackend,
    D: Deployer,
{
    store: &'a S,
    ctx: &'a DeployContext<'a, E, V>,
    registry: &'a [D],
    cancel: &'a AtomicBool,
}

impl<'a, S, E, V, D> DeploymentManager<'a, S, E, V, D>
where
    S: StateStore,
    E: CommandExecutor,
    V: VaultBackend,
    D: Deployer,
{
    pub fn new(
        store: &'a S,
        ctx: &'a DeployContext<'a, E, V>,
        registry: &'a [D],
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            store,
            ctx,
            registry,
            cancel,
        }
    }

    fn orchestrator(&self) -> PhaseOrchestrator<'a, S, E, V, D> {
        PhaseOrchestrator::new(self.store, self.ctx, self.registry, self.cancel)
    }

    /// Deploy `phases` (all six when empty).
    ///
    /// # Errors
    ///
    /// Returns an error only if state cannot be loaded or saved; service
    /// failures are part of the returned result.
    pub async fn run(&self, phases: &BTreeSet<PhaseId>, resume: bool) -> Result<DeploymentResult> {
        let requested = resolve_phases(phases);
        tracing::info!(
            phases = ?requested.iter().map(|p| p.number()).collect::<Vec<_>>(),
            resume,
            dry_run = self.ctx.dry_run(),
            "starting deployment"
        );

        if let Some(state) = self.store.load().await? {
            for gap in missing_prerequisites(&state, &requested, self.registry) {
                self.ctx.reporter.warn(&format!(
                    "{gap} is not complete; later phases may fail without it"
                ));
            }
        }

        let result = self.orchestrator().run(&requested, resume).await?;
        tracing::info!(
            completed = result.completed.len(),
            skipped = result.skipped.len(),
            failed = result.failed.len(),
            not_attempted = result.not_attempted.len(),
            "deployment finished"
        );
        Ok(result)
    }

    /// Destroy `phases` (all six when empty), latest phase first.
    ///
    /// # Errors
    ///
    /// Returns an error only if state cannot be loaded or saved.
    pub async fn destroy(&self, phases: &BTreeSet<PhaseId>) -> Result<DeploymentResult> {
        let requested = resolve_phases(phases);
        tracing::info!(
            phases = ?requested.iter().map(|p| p.number()).collect::<Vec<_>>(),
            dry_run = self.ctx.dry_run(),
            "starting destroy"
        );
        let result = self.orchestrator().destroy(&requested).await?;
        tracing::info!(
            destroyed = result.completed.len(),
            failed = result.failed.len(),
            "destroy finished"
        );
        Ok(result)
    }

    /// Commands run or intercepted so far.
    #[must_use]
    pub fn journal(&self) -> Vec<ExecRecord> {
        self.ctx.executor.journal()
    }
}

/// Empty selection means every phase.
#[must_use]
pub fn resolve_phases(phases: &BTreeSet<PhaseId>) -> BTreeSet<PhaseId> {
    if phases.is_empty() {
        PhaseId::ALL.iter().copied().collect()
    } else {
        phases.clone()
    }
}

/// Phases before the first requested one that are neither requested nor
/// fully completed in `state`.
pub fn missing_prerequisites<D: Deployer>(
    state: &DeploymentState,
    requested: &BTreeSet<PhaseId>,
    registry: &[D],
) -> Vec<PhaseId> {
    let Some(first) = requested.first() else {
        return Vec::new();
    };
    PhaseId::ALL
        .iter()
        .copied()
        .filter(|p| p < first && !requested.contains(p))
        .filter(|p| {
            !registry
                .iter()
                .filter(|u| u.phase() == *p)
                .filter_map(|u| ServiceId::new(u.service()).ok())
                .all(|id| state.is_service_done(*p, &id))
        })
        .collect()
}

/// Join persisted state with the registry so never-run services show up as
/// pending.
pub fn status_view<D: Deployer>(state: &DeploymentState, registry: &[D]) -> StatusView {
    let mut phases = Vec::new();
    for phase in PhaseId::ALL {
        let mut services = Vec::new();
        for unit in registry.iter().filter(|u| u.phase() == phase) {
            let Ok(id) = ServiceId::new(unit.service()) else {
                continue;
            };
            let row = match state.service(phase, &id) {
                Some(svc) => ServiceStatusView {
                    service: id.to_string(),
                    status: svc.status,
                    chart_version: svc.chart_version.clone(),
                    last_error: svc.last_error.clone(),
                    artifacts: svc.rendered_artifact_paths.len(),
                },
                None => ServiceStatusView {
                    service: id.to_string(),
                    status: ServiceStatus::Pending,
                    chart_version: None,
                    last_error: None,
                    artifacts: 0,
                },
            };
            services.push(row);
        }
        let completed = !services.is_empty()
            && services.iter().all(|s| s.status == ServiceStatus::Completed);
        phases.push(PhaseStatusView {
            phase,
            name: phase.name(),
            completed,
            services,
        });
    }
    let total = phases.iter().map(|p| p.services.len()).sum();
    let completed = phases
        .iter()
        .flat_map(|p| &p.services)
        .filter(|s| s.status == ServiceStatus::Completed)
        .count();
    StatusView {
        customer: state.customer.clone(),
        dry_run: state.dry_run,
        updated_at: state.updated_at,
        completed,
        total,
        phases,
    }
}
