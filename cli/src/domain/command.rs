//! Structured external commands.
//!
//! Every side-effecting operation is described as a `CommandSpec`: an argument
//! vector plus what a dry run should pretend happened. No shell strings are
//! ever built, so nothing needs quoting.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::RunKind;

/// Default timeout for short commands (kubectl, git).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for long-running infrastructure applies.
pub const LONG_TIMEOUT: Duration = Duration::from_secs(3600);

/// Fixed kubeconfig returned when a dry run needs cluster credentials.
pub const FAKE_KUBECONFIG: &str = "apiVersion: v1
kind: Config
clusters:
- name: dry-run
  cluster:
    server: https://dry-run.invalid:6443
    insecure-skip-tls-verify: true
contexts:
- name: dry-run
  context:
    cluster: dry-run
    user: dry-run
current-context: dry-run
users:
- name: dry-run
  user:
    token: dry-run-token
";

/// Fixed service-account descriptor returned when a dry run needs one.
pub const FAKE_SERVICE_ACCOUNT: &str = r#"{"type":"service_account","client_email":"dry-run@datastack.invalid","client_id":"000000000000000000000","private_key_id":"dry-run"}"#;

/// A well-formed value a dry run substitutes for real command output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FakeValue {
    /// A kubeconfig pointing at an unreachable dry-run cluster.
    ClusterCredential,
    /// A cloud service-account key descriptor.
    ServiceAccount,
}

impl FakeValue {
    #[must_use]
    pub fn content(self) -> &'static str {
        match self {
            FakeValue::ClusterCredential => FAKE_KUBECONFIG,
            FakeValue::ServiceAccount => FAKE_SERVICE_ACCOUNT,
        }
    }
}

/// What the executor does with a command in dry-run mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DryRunBehavior {
    /// Report success with empty output.
    Succeed,
    /// Report success with a fabricated value on stdout.
    Fabricate { value: FakeValue },
    /// Do nothing; there is no sensible synthetic result.
    Skip { reason: String },
}

/// An external command as an argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Piped to the process; never logged.
    pub stdin: Option<Vec<u8>>,
    pub timeout: Duration,
    pub dry_run: DryRunBehavior,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout: DEFAULT_TIMEOUT,
            dry_run: DryRunBehavior::Succeed,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn fabricate(mut self, value: FakeValue) -> Self {
        self.dry_run = DryRunBehavior::Fabricate { value };
        self
    }

    #[must_use]
    pub fn skip_in_dry_run(mut self, reason: impl Into<String>) -> Self {
        self.dry_run = DryRunBehavior::Skip {
            reason: reason.into(),
        };
        self
    }

    /// Argument slice in the shape the `CommandRunner` port takes.
    #[must_use]
    pub fn arg_refs(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }
}

/// Renders the command line for logs. Arguments containing whitespace are
/// single-quoted for readability only; the string is never executed.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Outcome of one command, real or intercepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// True when the result was fabricated by a dry run.
    pub synthetic: bool,
}

impl ExecResult {
    #[must_use]
    pub fn synthetic(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: Vec::new(),
            synthetic: true,
        }
    }

    #[must_use]
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Audit journal entry for one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRecord {
    pub command: String,
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Every command one deploy or destroy invocation went through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunJournal {
    pub kind: RunKind,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub commands: Vec<ExecRecord>,
}
