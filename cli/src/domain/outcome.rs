//! Results reported by deployers and by whole runs.

use chrono::{DateTime, Utc};
use datastack_common::{PhaseId, ServiceId, ServiceStatus};
use serde::{Deserialize, Serialize};

// ── Per-service results ───────────────────────────────────────────────────────

/// Outcome of one apply/destroy step (one artifact or one command).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub target: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// What a deployer's `apply` or `destroy` achieved, step by step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceResult {
    pub steps: Vec<StepOutcome>,
}

impl ServiceResult {
    pub fn ok(&mut self, target: impl Into<String>) {
        self.steps.push(StepOutcome {
            target: target.into(),
            ok: true,
            detail: None,
        });
    }

    pub fn failed(&mut self, target: impl Into<String>, detail: impl Into<String>) {
        self.steps.push(StepOutcome {
            target: target.into(),
            ok: false,
            detail: Some(detail.into()),
        });
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }

    #[must_use]
    pub fn first_failure(&self) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| !s.ok)
    }
}

// ── Run results ───────────────────────────────────────────────────────────────

/// A service addressed by phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRef {
    pub phase: PhaseId,
    pub service: ServiceId,
}

impl ServiceRef {
    #[must_use]
    pub fn new(phase: PhaseId, service: ServiceId) -> Self {
        Self { phase, service }
    }
}

/// Where and why a service failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub phase: PhaseId,
    pub service: ServiceId,
    pub error: String,
    /// Machine-readable error class, when the failure was typed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    /// The command that failed, when there was one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Which direction a run went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Deploy,
    Destroy,
}

/// Summary of a deploy or destroy run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentResult {
    pub kind: RunKind,
    pub dry_run: bool,
    pub completed: Vec<ServiceRef>,
    pub skipped: Vec<ServiceRef>,
    pub failed: Vec<FailureReport>,
    pub not_attempted: Vec<ServiceRef>,
    pub interrupted: bool,
    /// Completed services a resumed run would skip.
    pub resumable_completed: usize,
}

impl DeploymentResult {
    #[must_use]
    pub fn new(kind: RunKind, dry_run: bool) -> Self {
        Self {
            kind,
            dry_run,
            completed: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            not_attempted: Vec::new(),
            interrupted: false,
            resumable_completed: 0,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.interrupted
    }

    /// Process exit code for this result.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_success())
    }

    #[must_use]
    pub fn was_completed(&self, phase: PhaseId, service: &str) -> bool {
        contains(&self.completed, phase, service)
    }

    #[must_use]
    pub fn was_skipped(&self, phase: PhaseId, service: &str) -> bool {
        contains(&self.skipped, phase, service)
    }

    #[must_use]
    pub fn was_attempted(&self, phase: PhaseId, service: &str) -> bool {
        self.was_completed(phase, service)
            || self
                .failed
                .iter()
                .any(|f| f.phase == phase && f.service.as_str() == service)
    }
}

// ── Status view ───────────────────────────────────────────────────────────────

/// One service row of `datastack status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatusView {
    pub service: String,
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub artifacts: usize,
}

/// One phase of `datastack status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseStatusView {
    pub phase: PhaseId,
    pub name: &'static str,
    pub completed: bool,
    pub services: Vec<ServiceStatusView>,
}

/// Persisted progress joined with the registry, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub customer: String,
    pub dry_run: bool,
    pub updated_at: DateTime<Utc>,
    pub completed: usize,
    pub total: usize,
    pub phases: Vec<PhaseStatusView>,
}

fn contains(list: &[ServiceRef], phase: PhaseId, service: &str) -> bool {
    list.iter()
        .any(|r| r.phase == phase && r.service.as_str() == service)
}
