use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a persisted value or transition is invalid.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid phase {0}: phases are numbered 1 to 6")]
    InvalidPhase(u8),

    #[error("invalid service id '{0}': must match ^[a-z0-9][a-z0-9-]*$")]
    InvalidServiceId(String),

    #[error("illegal transition for {service}: {from} -> {to}")]
    InvalidTransition {
        service: String,
        from: ServiceStatus,
        to: ServiceStatus,
    },
}

/// Target cloud for the platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Gcp,
    Azure,
}

impl CloudProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Gcp => "gcp",
            CloudProvider::Azure => "azure",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the six fixed deployment phases.
///
/// Serialized as its number so the state file keys read `"1"` .. `"6"`.
/// Ordering follows the phase number.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub enum PhaseId {
    Infrastructure = 1,
    Secrets = 2,
    Repositories = 3,
    InfrastructureServices = 4,
    DataServices = 5,
    Finalize = 6,
}

impl PhaseId {
    /// All phases in execution order.
    pub const ALL: [PhaseId; 6] = [
        PhaseId::Infrastructure,
        PhaseId::Secrets,
        PhaseId::Repositories,
        PhaseId::InfrastructureServices,
        PhaseId::DataServices,
        PhaseId::Finalize,
    ];

    #[must_use]
    pub fn number(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PhaseId::Infrastructure => "infrastructure",
            PhaseId::Secrets => "secrets",
            PhaseId::Repositories => "repositories",
            PhaseId::InfrastructureServices => "infrastructure-services",
            PhaseId::DataServices => "data-services",
            PhaseId::Finalize => "finalize",
        }
    }

    /// Directory name under `artifacts/`, e.g. `04-infrastructure-services`.
    #[must_use]
    pub fn dir_name(self) -> String {
        format!("{:02}-{}", self.number(), self.name())
    }
}

impl TryFrom<u8> for PhaseId {
    type Error = StateError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PhaseId::Infrastructure),
            2 => Ok(PhaseId::Secrets),
            3 => Ok(PhaseId::Repositories),
            4 => Ok(PhaseId::InfrastructureServices),
            5 => Ok(PhaseId::DataServices),
            6 => Ok(PhaseId::Finalize),
            other => Err(StateError::InvalidPhase(other)),
        }
    }
}

impl From<PhaseId> for u8 {
    fn from(phase: PhaseId) -> Self {
        phase.number()
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase {} ({})", self.number(), self.name())
    }
}

/// Identifier of one deployable service unit, e.g. `airflow`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceId(String);

impl ServiceId {
    /// Validate and wrap a service id.
    pub fn new(id: impl Into<String>) -> Result<Self, StateError> {
        let id = id.into();
        let mut chars = id.chars();
        let valid_first = chars
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if valid_first && valid_rest && id.len() <= 63 {
            Ok(Self(id))
        } else {
            Err(StateError::InvalidServiceId(id))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServiceId {
    type Error = StateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServiceId> for String {
    fn from(id: ServiceId) -> Self {
        id.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Progress of a single service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Pending,
    Rendering,
    Applying,
    Completed,
    Failed,
}

impl ServiceStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Pending => "pending",
            ServiceStatus::Rendering => "rendering",
            ServiceStatus::Applying => "applying",
            ServiceStatus::Completed => "completed",
            ServiceStatus::Failed => "failed",
        }
    }

    /// Statuses reachable from this one.
    ///
    /// `Pending` is reachable from the terminal states only through an
    /// explicit reset (fresh run or destroy).
    #[must_use]
    pub fn valid_next(self) -> &'static [ServiceStatus] {
        match self {
            ServiceStatus::Pending => &[ServiceStatus::Rendering],
            ServiceStatus::Rendering => &[ServiceStatus::Applying, ServiceStatus::Failed],
            ServiceStatus::Applying => &[ServiceStatus::Completed, ServiceStatus::Failed],
            ServiceStatus::Completed | ServiceStatus::Failed => &[ServiceStatus::Pending],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: ServiceStatus) -> bool {
        self.valid_next().contains(&next)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ServiceStatus::Completed | ServiceStatus::Failed)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted progress of one service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceState {
    pub service_id: ServiceId,
    #[serde(default)]
    pub status: ServiceStatus,
    /// Artifact paths relative to the working directory.
    #[serde(default)]
    pub rendered_artifact_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_version: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceState {
    #[must_use]
    pub fn new(service_id: ServiceId) -> Self {
        Self {
            service_id,
            status: ServiceStatus::Pending,
            rendered_artifact_paths: Vec::new(),
            last_error: None,
            chart_version: None,
            updated_at: Utc::now(),
        }
    }

    /// Move to `next`, rejecting transitions outside the legal set.
    pub fn transition_to(&mut self, next: ServiceStatus) -> Result<(), StateError> {
        if !self.status.can_transition_to(next) {
            return Err(StateError::InvalidTransition {
                service: self.service_id.to_string(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        if next != ServiceStatus::Failed {
            self.last_error = None;
        }
        Ok(())
    }

    /// Record a failure from either `Rendering` or `Applying`.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), StateError> {
        self.transition_to(ServiceStatus::Failed)?;
        self.last_error = Some(error.into());
        Ok(())
    }

    /// Return a terminal service to `Pending`; a no-op for a pending one.
    ///
    /// An in-flight status (a run killed mid-service) is also reset, since the
    /// only correct reading of it is "not done".
    pub fn reset(&mut self) {
        self.status = ServiceStatus::Pending;
        self.last_error = None;
        self.updated_at = Utc::now();
    }
}

/// Persisted progress of one phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseState {
    pub phase_id: PhaseId,
    #[serde(default)]
    pub services: BTreeMap<ServiceId, ServiceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PhaseState {
    #[must_use]
    pub fn new(phase_id: PhaseId) -> Self {
        Self {
            phase_id,
            services: BTreeMap::new(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Get or insert the state entry for a service.
    pub fn service_mut(&mut self, id: &ServiceId) -> &mut ServiceState {
        self.services
            .entry(id.clone())
            .or_insert_with(|| ServiceState::new(id.clone()))
    }

    #[must_use]
    pub fn count(&self, status: ServiceStatus) -> usize {
        self.services.values().filter(|s| s.status == status).count()
    }
}

/// Complete persisted deployment progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentState {
    pub customer: String,
    pub cloud_provider: CloudProvider,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub phases: BTreeMap<PhaseId, PhaseState>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentState {
    #[must_use]
    pub fn new(customer: impl Into<String>, cloud_provider: CloudProvider, dry_run: bool) -> Self {
        Self {
            customer: customer.into(),
            cloud_provider,
            dry_run,
            phases: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Get or insert the state entry for a phase.
    pub fn phase_mut(&mut self, phase: PhaseId) -> &mut PhaseState {
        self.phases
            .entry(phase)
            .or_insert_with(|| PhaseState::new(phase))
    }

    #[must_use]
    pub fn service(&self, phase: PhaseId, id: &ServiceId) -> Option<&ServiceState> {
        self.phases.get(&phase).and_then(|p| p.services.get(id))
    }

    /// True when the service finished successfully in an earlier run.
    #[must_use]
    pub fn is_service_done(&self, phase: PhaseId, id: &ServiceId) -> bool {
        self.service(phase, id)
            .is_some_and(|s| s.status == ServiceStatus::Completed)
    }

    /// Forget all progress recorded for a phase.
    pub fn reset_phase(&mut self, phase: PhaseId) {
        self.phases.remove(&phase);
        self.touch();
    }

    /// Number of services currently marked completed across all phases.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.phases
            .values()
            .map(|p| p.count(ServiceStatus::Completed))
            .sum()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
