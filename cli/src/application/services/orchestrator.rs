//! Phase orchestrator: runs registered units phase by phase and records
//! every status transition before moving on.
//!
//! Deploy is fail-fast: the first failing service halts the run. Destroy is
//! best-effort: every unit is attempted and failures are collected.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use chrono::Utc;
use datastack_common::{DeploymentState, PhaseId, ServiceId, ServiceStatus};

use crate::application::deployer::{DeployContext, Deployer};
use crate::application::ports::{CommandExecutor, StateStore, VaultBackend};
use crate::domain::{
    DeployError, DeploymentResult, FailureReport, RunKind, ServiceRef, ServiceResult, classify,
};

/// Sequences deployers and keeps the state store in step with them.
pub struct PhaseOrchestrator<'a, S, E, V, D>
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

impl<'a, S, E, V, D> PhaseOrchestrator<'a, S, E, V, D>
where
    S: StateStore,
    E: CommandExecutor,
    V: VaultBackend,
    D: Deployer,
{
    /// `registry` must be in declared `(phase, order)` order.
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

    /// Deploy every unit of the requested phases.
    ///
    /// With `resume`, services already completed are skipped; without it the
    /// requested phases are reset first.
    ///
    /// # Errors
    ///
    /// Service failures are reported in the result, not as errors. An error
    /// is returned only when the state store itself fails or the loaded
    /// state belongs to a different deployment.
    pub async fn run(&self, requested: &BTreeSet<PhaseId>, resume: bool) -> Result<DeploymentResult> {
        let mut state = self.load_state().await?;
        if !resume {
            for phase in requested {
                state.reset_phase(*phase);
            }
        }
        self.save(&mut state).await?;

        let mut result = DeploymentResult::new(RunKind::Deploy, self.ctx.dry_run());
        let mut halted = false;

        for unit in self.units(requested, false) {
            let phase = unit.phase();
            let id = ServiceId::new(unit.service())?;
            let service_ref = ServiceRef::new(phase, id.clone());

            if halted {
                result.not_attempted.push(service_ref);
                continue;
            }
            if self.cancel.load(Ordering::SeqCst) {
                tracing::warn!("interrupted; stopping before {phase}/{id}");
                result.interrupted = true;
                halted = true;
                result.not_attempted.push(service_ref);
                continue;
            }
            if resume && state.is_service_done(phase, &id) {
                tracing::info!(%phase, service = %id, "already completed, skipping");
                self.ctx
                    .reporter
                    .success(&format!("{phase}/{id}: already completed"));
                result.skipped.push(service_ref);
                continue;
            }

            self.ctx.reporter.step(&format!("{phase}/{id}"));
            match self.deploy_one(&mut state, unit, phase, &id).await? {
                Ok(()) => {
                    self.ctx.reporter.success(&format!("{phase}/{id}"));
                    result.completed.push(service_ref);
                }
                Err(err) => {
                    self.ctx.reporter.warn(&format!("{phase}/{id} failed"));
                    tracing::error!(%phase, service = %id, error = %format!("{err:#}"), "service failed");
                    result.failed.push(failure_report(phase, id, &err));
                    halted = true;
                }
            }
        }

        result.resumable_completed = state.completed_count();
        Ok(result)
    }

    /// Destroy every unit of the requested phases in reverse order.
    ///
    /// Destroy ignores `resume`: every unit is attempted, failures are
    /// collected, and destroyed services go back to `pending`. When every
    /// recorded phase is gone the state file is removed.
    ///
    /// # Errors
    ///
    /// Returns an error only when the state store fails.
    pub async fn destroy(&self, requested: &BTreeSet<PhaseId>) -> Result<DeploymentResult> {
        let mut state = self.load_state().await?;
        let mut result = DeploymentResult::new(RunKind::Destroy, self.ctx.dry_run());

        for unit in self.units(requested, true) {
            let phase = unit.phase();
            let id = ServiceId::new(unit.service())?;
            let service_ref = ServiceRef::new(phase, id.clone());

            if self.cancel.load(Ordering::SeqCst) {
                result.interrupted = true;
                result.not_attempted.push(service_ref);
                continue;
            }

            self.ctx.reporter.step(&format!("destroying {phase}/{id}"));
            match self.destroy_one(unit).await {
                Ok(()) => {
                    state.phase_mut(phase).service_mut(&id).reset();
                    self.ctx.reporter.success(&format!("destroyed {phase}/{id}"));
                    result.completed.push(service_ref);
                }
                Err(err) => {
                    self.ctx.reporter.warn(&format!("{phase}/{id} destroy failed"));
                    tracing::error!(%phase, service = %id, error = %format!("{err:#}"), "destroy failed");
                    let svc = state.phase_mut(phase).service_mut(&id);
                    svc.last_error = Some(format!("destroy: {err:#}"));
                    result.failed.push(failure_report(phase, id, &err));
                }
            }
            self.save(&mut state).await?;
        }

        if result.failed.is_empty() && !result.interrupted {
            for phase in requested {
                state.reset_phase(*phase);
            }
            if state.phases.is_empty() {
                self.store.clear().await?;
            } else {
                self.save(&mut state).await?;
            }
        }

        result.resumable_completed = state.completed_count();
        Ok(result)
    }

    // ── Per-service steps ────────────────────────────────────────────────────

    /// Outer `Result` is a state-store failure (aborts the run); inner is the
    /// service's own failure.
    async fn deploy_one(
        &self,
        state: &mut DeploymentState,
        unit: &D,
        phase: PhaseId,
        id: &ServiceId,
    ) -> Result<Result<()>> {
        {
            let phase_state = state.phase_mut(phase);
            phase_state.started_at.get_or_insert_with(Utc::now);
            phase_state.completed_at = None;
            let svc = phase_state.service_mut(id);
            svc.reset();
            svc.transition_to(ServiceStatus::Rendering)?;
            svc.chart_version = unit.chart_version(self.ctx.config);
        }
        self.save(state).await?;

        let artifacts = match unit
            .render(self.ctx)
            .with_context(|| format!("rendering {id}"))
        {
            Ok(paths) => paths,
            Err(err) => {
                state.phase_mut(phase).service_mut(id).fail(format!("{err:#}"))?;
                self.save(state).await?;
                return Ok(Err(err));
            }
        };

        {
            let svc = state.phase_mut(phase).service_mut(id);
            svc.rendered_artifact_paths = artifacts
                .iter()
                .map(|p| self.ctx.layout.relative(p))
                .collect();
            svc.transition_to(ServiceStatus::Applying)?;
        }
        self.save(state).await?;

        let applied = match unit
            .apply(self.ctx, &artifacts)
            .await
            .with_context(|| format!("applying {id}"))
        {
            Ok(outcome) => step_failure(outcome),
            Err(err) => Err(err),
        };

        match applied {
            Ok(()) => {
                state
                    .phase_mut(phase)
                    .service_mut(id)
                    .transition_to(ServiceStatus::Completed)?;
                self.mark_phase_complete(state, phase);
                self.save(state).await?;
                Ok(Ok(()))
            }
            Err(err) => {
                state.phase_mut(phase).service_mut(id).fail(format!("{err:#}"))?;
                self.save(state).await?;
                Ok(Err(err))
            }
        }
    }

    async fn destroy_one(&self, unit: &D) -> Result<()> {
        let outcome = unit
            .destroy(self.ctx)
            .await
            .with_context(|| format!("destroying {}", unit.service()))?;
        step_failure(outcome)
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn units(&self, requested: &BTreeSet<PhaseId>, reverse: bool) -> Vec<&'a D> {
        let mut units: Vec<&'a D> = self
            .registry
            .iter()
            .filter(|u| requested.contains(&u.phase()))
            .collect();
        // Stable: equal keys keep their declared order.
        units.sort_by_key(|u| (u.phase(), u.order()));
        if reverse {
            units.reverse();
        }
        units
    }

    fn mark_phase_complete(&self, state: &mut DeploymentState, phase: PhaseId) {
        let all_done = self
            .registry
            .iter()
            .filter(|u| u.phase() == phase)
            .filter_map(|u| ServiceId::new(u.service()).ok())
            .all(|id| state.is_service_done(phase, &id));
        if all_done {
            state.phase_mut(phase).completed_at = Some(Utc::now());
        }
    }

    async fn load_state(&self) -> Result<DeploymentState> {
        let config = self.ctx.config;
        let dry_run = self.ctx.dry_run();
        match self.store.load().await? {
            Some(state) => {
                if state.customer != config.customer || state.cloud_provider != config.cloud_provider {
                    return Err(DeployError::config(
                        format!(
                            "state belongs to {} on {}, config is {} on {}",
                            state.customer, state.cloud_provider, config.customer, config.cloud_provider
                        ),
                        "use a separate --workdir per deployment",
                    )
                    .into());
                }
                Ok(state)
            }
            None => Ok(DeploymentState::new(
                config.customer.clone(),
                config.cloud_provider,
                dry_run,
            )),
        }
    }

    async fn save(&self, state: &mut DeploymentState) -> Result<()> {
        state.touch();
        self.store.save(state).await.context("saving deployment state")
    }
}

fn step_failure(outcome: ServiceResult) -> Result<()> {
    match outcome.first_failure() {
        None => Ok(()),
        Some(step) => Err(anyhow::anyhow!(
            "{} failed: {}",
            step.target,
            step.detail.as_deref().unwrap_or("no detail")
        )),
    }
}

fn failure_report(phase: PhaseId, service: ServiceId, err: &anyhow::Error) -> FailureReport {
    let typed = classify(err);
    FailureReport {
        phase,
        service,
        error: format!("{err:#}"),
        code: typed.map(DeployError::code),
        command: typed.and_then(DeployError::command).map(str::to_string),
    }
}

