//! Infrastructure implementation of the `CommandRunner` port.
//!
//! `TokioCommandRunner` runs external tools (terraform, helm, kubectl, git)
//! with a hard timeout: on expiry the child is killed explicitly and the
//! call fails with `DeployError::CommandTimedOut`.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;

use crate::application::ports::CommandRunner;
use crate::domain::DeployError;

/// Production `CommandRunner`.
///
/// `tokio::time::timeout` around `.output().await` only drops the future; the
/// process keeps running. `tokio::select!` with an explicit `child.kill()`
/// guarantees it is gone before the error is returned.
#[derive(Debug, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;
        wait_with_timeout(child, program, args, timeout).await
    }

    async fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        input: &[u8],
        timeout: Duration,
    ) -> Result<Output> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        // Write stdin from a separate task so a child that fills its stdout
        // pipe before reading all input cannot deadlock us.
        let stdin_handle = child.stdin.take();
        let input_owned = input.to_vec();
        let stdin_task = tokio::spawn(async move {
            if let Some(mut stdin) = stdin_handle {
                let _ = stdin.write_all(&input_owned).await;
            }
        });

        let output = wait_with_timeout(child, program, args, timeout).await;
        let _ = stdin_task.await;
        output
    }

    fn spawn(&self, program: &str, args: &[&str]) -> Result<Child> {
        tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))
    }
}

async fn wait_with_timeout(
    mut child: Child,
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<Output> {
    let mut stdout_handle = child.stdout.take();
    let mut stderr_handle = child.stderr.take();

    tokio::select! {
        result = async {
            let (status, stdout, stderr) = tokio::join!(
                child.wait(),
                read_all(stdout_handle.as_mut()),
                read_all(stderr_handle.as_mut()),
            );
            Ok(Output {
                status: status.with_context(|| format!("waiting for {program}"))?,
                stdout,
                stderr,
            })
        } => result,
        () = tokio::time::sleep(timeout) => {
            let _ = child.kill().await;
            Err(DeployError::CommandTimedOut {
                command: std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" "),
                secs: timeout.as_secs(),
            }
            .into())
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(handle: Option<&mut R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.read_to_end(&mut buf).await;
    }
    buf
}
