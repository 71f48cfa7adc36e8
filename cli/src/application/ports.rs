//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and the shared types crate;
//! never from `crate::infra`, `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use datastack_common::{DeploymentState, PhaseId, ServiceId};

use crate::domain::{CommandSpec, ExecRecord, ExecResult, SecretValue};

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
///
/// Only the executor talks to a runner; a dry run never reaches one.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output, killing it after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned, or a
    /// `DeployError::CommandTimedOut` if it exceeds `timeout`.
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
    /// Run a program with stdin piped from `stdin`, killing it after `timeout`.
    async fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        stdin: &[u8],
        timeout: Duration,
    ) -> Result<Output>;
    /// Spawn a long-lived program without waiting for it to finish.
    ///
    /// The child is killed when dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn spawn(&self, program: &str, args: &[&str]) -> Result<tokio::process::Child>;
}

// ── Command Executor Port ─────────────────────────────────────────────────────

/// The single choke-point for externally side-effecting operations.
///
/// Deployers are written as if every command really runs; whether it does is
/// decided once, when the executor is constructed.
#[allow(async_fn_in_trait)]
pub trait CommandExecutor {
    /// Execute a command, or intercept it in dry-run mode.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::CommandFailed` on a non-zero exit and
    /// `DeployError::CommandTimedOut` on timeout.
    async fn execute(&self, cmd: &CommandSpec) -> Result<ExecResult>;
    /// Start a background helper (e.g. a port-forward).
    ///
    /// Returns `None` when intercepted by a dry run.
    fn spawn_background(&self, cmd: &CommandSpec) -> Result<Option<tokio::process::Child>>;
    /// True when commands are intercepted rather than run.
    fn is_dry_run(&self) -> bool;
    /// Every command executed or intercepted so far, in order.
    fn journal(&self) -> Vec<ExecRecord>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait; no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
    /// Show a value the operator must record now; it is never shown again.
    fn reveal(&self, label: &str, value: &str);
}

// ── State Port ────────────────────────────────────────────────────────────────

/// Abstracts deployment state persistence.
#[allow(async_fn_in_trait)]
pub trait StateStore {
    /// Load the persisted state, returning `None` if no state exists.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::StateCorruption` if the file cannot be trusted.
    async fn load(&self) -> Result<Option<DeploymentState>>;
    /// Persist the given state atomically.
    async fn save(&self, state: &DeploymentState) -> Result<()>;
    /// Remove the persisted state.
    async fn clear(&self) -> Result<()>;

    /// True when the persisted state marks the service completed.
    async fn is_service_done(&self, phase: PhaseId, service: &ServiceId) -> Result<bool> {
        Ok(self
            .load()
            .await?
            .is_some_and(|state| state.is_service_done(phase, service)))
    }
}

// ── Vault Port ────────────────────────────────────────────────────────────────

/// A secret storage backend. Paths follow `datastack_common::secret_paths`.
#[allow(async_fn_in_trait)]
pub trait VaultBackend {
    /// Human-readable backend name for logs and errors.
    fn name(&self) -> &str;
    /// Write (create or replace) a secret.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::BackendUnavailable` when the backend cannot be
    /// reached.
    async fn put(&self, path: &str, value: &SecretValue) -> Result<()>;
    /// Read a secret, returning `None` if it does not exist.
    async fn get(&self, path: &str) -> Result<Option<SecretValue>>;
}

// ── Artifact Port ─────────────────────────────────────────────────────────────

/// Writes rendered artifacts to local disk.
pub trait LocalArtifactWriter {
    /// Write `content` to `path`, creating parent directories.
    ///
    /// Unchanged content leaves the file untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    fn write_artifact(&self, path: &Path, content: &[u8]) -> Result<()>;
    /// Remove stale files in `dir` that are not in `keep`.
    fn prune(&self, dir: &Path, keep: &[PathBuf]) -> Result<()>;
}
