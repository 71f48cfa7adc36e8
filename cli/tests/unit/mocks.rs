//! Shared mock infrastructure for unit tests.
//!
//! Provides port implementations that record what they were asked to do, so
//! each test file doesn't have to re-define the same boilerplate.

#![allow(clippy::expect_used, dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Output;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use datastack_cli::application::ports::{
    CommandExecutor, CommandRunner, ProgressReporter, StateStore, VaultBackend,
};
use datastack_cli::application::{DeployContext, Deployer};
use datastack_cli::domain::{CommandSpec, DeployError, PlatformConfig, SecretValue, ServiceResult};
use datastack_common::{DeploymentState, PhaseId, ServiceId};

use crate::helpers::{err_output, ok_output};

// ── Command runners ───────────────────────────────────────────────────────────

/// Records every command line and succeeds, except for lines containing
/// `fail_on`.
#[derive(Default)]
pub struct SpyRunner {
    pub calls: Mutex<Vec<String>>,
    pub fail_on: Option<String>,
}

impl SpyRunner {
    pub fn failing_on(needle: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: Some(needle.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    fn answer(&self, program: &str, args: &[&str]) -> Output {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        let fails = self.fail_on.as_deref().is_some_and(|n| line.contains(n));
        self.calls.lock().expect("lock").push(line);
        if fails {
            err_output(1, b"simulated failure")
        } else {
            ok_output(b"")
        }
    }
}

impl CommandRunner for SpyRunner {
    async fn run_with_timeout(&self, program: &str, args: &[&str], _: Duration) -> Result<Output> {
        Ok(self.answer(program, args))
    }

    async fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        _stdin: &[u8],
        _: Duration,
    ) -> Result<Output> {
        Ok(self.answer(program, args))
    }

    fn spawn(&self, program: &str, _: &[&str]) -> Result<tokio::process::Child> {
        anyhow::bail!("spawning {program} not expected in this test")
    }
}

/// Fails the test if anything reaches it.
pub struct UnreachableRunner;

impl CommandRunner for UnreachableRunner {
    async fn run_with_timeout(&self, program: &str, _: &[&str], _: Duration) -> Result<Output> {
        panic!("{program} reached the runner");
    }

    async fn run_with_stdin(
        &self,
        program: &str,
        _: &[&str],
        _: &[u8],
        _: Duration,
    ) -> Result<Output> {
        panic!("{program} reached the runner");
    }

    fn spawn(&self, program: &str, _: &[&str]) -> Result<tokio::process::Child> {
        panic!("{program} reached the runner");
    }
}

// ── Vault backends ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryVault {
    pub values: Mutex<HashMap<String, String>>,
    pub puts: Mutex<Vec<String>>,
}

impl MemoryVault {
    pub fn with(path: &str, value: &str) -> Self {
        let vault = Self::default();
        vault
            .values
            .lock()
            .expect("lock")
            .insert(path.to_string(), value.to_string());
        vault
    }

    pub fn puts(&self) -> Vec<String> {
        self.puts.lock().expect("lock").clone()
    }

    pub fn value(&self, path: &str) -> Option<String> {
        self.values.lock().expect("lock").get(path).cloned()
    }
}

impl VaultBackend for MemoryVault {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, path: &str, value: &SecretValue) -> Result<()> {
        self.puts.lock().expect("lock").push(path.to_string());
        self.values
            .lock()
            .expect("lock")
            .insert(path.to_string(), value.expose().to_string());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<SecretValue>> {
        Ok(self
            .values
            .lock()
            .expect("lock")
            .get(path)
            .map(|v| SecretValue::new(v.clone())))
    }
}

pub struct UnreachableVault;

impl VaultBackend for UnreachableVault {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn put(&self, _: &str, _: &SecretValue) -> Result<()> {
        Err(DeployError::BackendUnavailable {
            backend: "unreachable".into(),
            reason: "connection refused".into(),
        }
        .into())
    }

    async fn get(&self, _: &str) -> Result<Option<SecretValue>> {
        Err(DeployError::BackendUnavailable {
            backend: "unreachable".into(),
            reason: "connection refused".into(),
        }
        .into())
    }
}

// ── State store ───────────────────────────────────────────────────────────────

/// Keeps the current state plus every saved snapshot, in order.
#[derive(Default)]
pub struct MemoryStateStore {
    pub state: Mutex<Option<DeploymentState>>,
    pub history: Mutex<Vec<DeploymentState>>,
    pub cleared: Mutex<bool>,
}

impl MemoryStateStore {
    pub fn with(state: DeploymentState) -> Self {
        let store = Self::default();
        *store.state.lock().expect("lock") = Some(state);
        store
    }

    pub fn current(&self) -> Option<DeploymentState> {
        self.state.lock().expect("lock").clone()
    }

    pub fn history(&self) -> Vec<DeploymentState> {
        self.history.lock().expect("lock").clone()
    }

    pub fn was_cleared(&self) -> bool {
        *self.cleared.lock().expect("lock")
    }
}

impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<DeploymentState>> {
        Ok(self.current())
    }

    async fn save(&self, state: &DeploymentState) -> Result<()> {
        self.history.lock().expect("lock").push(state.clone());
        *self.state.lock().expect("lock") = Some(state.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.state.lock().expect("lock") = None;
        *self.cleared.lock().expect("lock") = true;
        Ok(())
    }
}

// ── Progress reporter ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingReporter {
    pub events: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("lock").clone()
    }

    fn push(&self, kind: &str, message: &str) {
        self.events
            .lock()
            .expect("lock")
            .push(format!("{kind}: {message}"));
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.push("step", message);
    }
    fn success(&self, message: &str) {
        self.push("success", message);
    }
    fn warn(&self, message: &str) {
        self.push("warn", message);
    }
    fn reveal(&self, label: &str, _value: &str) {
        self.push("reveal", label);
    }
}

// ── Deployer ──────────────────────────────────────────────────────────────────

/// Writes one artifact and runs `tool apply <service>` / `tool destroy <service>`.
pub struct FakeUnit {
    pub phase: PhaseId,
    pub order: u8,
    pub service: &'static str,
}

/// A unit that runs where it is declared within its phase.
pub const fn unit(phase: PhaseId, service: &'static str) -> FakeUnit {
    FakeUnit {
        phase,
        order: 0,
        service,
    }
}

pub const fn ordered(phase: PhaseId, order: u8, service: &'static str) -> FakeUnit {
    FakeUnit {
        phase,
        order,
        service,
    }
}

impl Deployer for FakeUnit {
    fn service(&self) -> &str {
        self.service
    }

    fn phase(&self) -> PhaseId {
        self.phase
    }

    fn order(&self) -> u8 {
        self.order
    }

    fn chart_version(&self, _config: &PlatformConfig) -> Option<String> {
        Some("1.0.0".into())
    }

    fn render<E: CommandExecutor, V: VaultBackend>(
        &self,
        ctx: &DeployContext<'_, E, V>,
    ) -> Result<Vec<PathBuf>> {
        let id = ServiceId::new(self.service)?;
        let path = ctx.layout.service_dir(self.phase, &id).join("unit.txt");
        Ok(vec![ctx.renderer.write(&path, self.service)?])
    }

    async fn apply<E: CommandExecutor, V: VaultBackend>(
        &self,
        ctx: &DeployContext<'_, E, V>,
        _artifacts: &[PathBuf],
    ) -> Result<ServiceResult> {
        ctx.executor
            .execute(&CommandSpec::new("tool").args(["apply", self.service]))
            .await?;
        let mut result = ServiceResult::default();
        result.ok(self.service);
        Ok(result)
    }

    async fn destroy<E: CommandExecutor, V: VaultBackend>(
        &self,
        ctx: &DeployContext<'_, E, V>,
    ) -> Result<ServiceResult> {
        ctx.executor
            .execute(&CommandSpec::new("tool").args(["destroy", self.service]))
            .await?;
        let mut result = ServiceResult::default();
        result.ok(self.service);
        Ok(result)
    }
}
