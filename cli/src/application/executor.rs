//! The dry-run boundary.
//!
//! `Executor` is the only component that decides whether a command really
//! runs. Everything upstream (deployers, services) builds the same
//! `CommandSpec`s in both modes.

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use anyhow::Result;

use crate::application::ports::{CommandExecutor, CommandRunner};
use crate::domain::{CommandSpec, DeployError, DryRunBehavior, ExecRecord, ExecResult};

/// Log target for intercepted commands. The default log filter enables it at
/// `info`, so a dry run lists what it would have executed.
pub const DRY_RUN_TARGET: &str = "datastack::dry_run";

/// Executes or intercepts commands and keeps an audit journal of both.
pub struct Executor<R: CommandRunner> {
    runner: R,
    dry_run: bool,
    journal: Mutex<Vec<ExecRecord>>,
}

impl<R: CommandRunner> Executor<R> {
    /// Create an executor. In dry-run mode `runner` is never called.
    pub fn new(runner: R, dry_run: bool) -> Self {
        Self {
            runner,
            dry_run,
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Access the underlying runner (tests inspect recorded calls).
    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn record(&self, record: ExecRecord) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    fn intercept(&self, cmd: &CommandSpec, line: String) -> ExecResult {
        let (result, note) = match &cmd.dry_run {
            DryRunBehavior::Succeed => {
                tracing::info!(target: DRY_RUN_TARGET, "[DRY-RUN] Would execute: {line}");
                (ExecResult::synthetic(Vec::new()), None)
            }
            DryRunBehavior::Fabricate { value } => {
                tracing::info!(target: DRY_RUN_TARGET, "[DRY-RUN] Would execute: {line}");
                tracing::debug!(?value, "returning fabricated output");
                (
                    ExecResult::synthetic(value.content()),
                    Some(format!("fabricated {value:?}")),
                )
            }
            DryRunBehavior::Skip { reason } => {
                tracing::info!(target: DRY_RUN_TARGET, "[DRY-RUN] Would execute: {line}");
                tracing::info!(target: DRY_RUN_TARGET, "[DRY-RUN] skipped: {reason}");
                (ExecResult::synthetic(Vec::new()), Some(reason.clone()))
            }
        };
        self.record(ExecRecord {
            command: line,
            dry_run: true,
            exit_code: None,
            duration_ms: 0,
            note,
        });
        result
    }
}

impl<R: CommandRunner> CommandExecutor for Executor<R> {
    async fn execute(&self, cmd: &CommandSpec) -> Result<ExecResult> {
        let line = cmd.to_string();
        if self.dry_run {
            return Ok(self.intercept(cmd, line));
        }

        tracing::debug!(command = %line, timeout_secs = cmd.timeout.as_secs(), "executing");
        let started = Instant::now();
        let args = cmd.arg_refs();
        let outcome = match &cmd.stdin {
            Some(input) => {
                self.runner
                    .run_with_stdin(&cmd.program, &args, input, cmd.timeout)
                    .await
            }
            None => {
                self.runner
                    .run_with_timeout(&cmd.program, &args, cmd.timeout)
                    .await
            }
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let output = match outcome {
            Ok(output) => output,
            Err(err) => {
                self.record(ExecRecord {
                    command: line,
                    dry_run: false,
                    exit_code: None,
                    duration_ms,
                    note: Some(format!("{err:#}")),
                });
                return Err(err);
            }
        };

        let code = output.status.code().unwrap_or(-1);
        self.record(ExecRecord {
            command: line.clone(),
            dry_run: false,
            exit_code: Some(code),
            duration_ms,
            note: None,
        });

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::warn!(command = %line, code, "command failed");
            return Err(DeployError::CommandFailed {
                command: line,
                code,
                stderr,
            }
            .into());
        }

        Ok(ExecResult {
            exit_code: code,
            stdout: output.stdout,
            stderr: output.stderr,
            synthetic: false,
        })
    }

    fn spawn_background(&self, cmd: &CommandSpec) -> Result<Option<tokio::process::Child>> {
        let line = cmd.to_string();
        if self.dry_run {
            self.intercept(cmd, line);
            return Ok(None);
        }
        tracing::debug!(command = %line, "spawning background helper");
        let child = self.runner.spawn(&cmd.program, &cmd.arg_refs())?;
        self.record(ExecRecord {
            command: line,
            dry_run: false,
            exit_code: None,
            duration_ms: 0,
            note: Some("background".to_string()),
        });
        Ok(Some(child))
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn journal(&self) -> Vec<ExecRecord> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
