//! Working-directory layout.
//!
//! ```text
//! <workdir>/
//!   config.yaml
//!   state.json              (dry run: state.dry-run.json)
//!   artifacts/<NN>-<phase>/<service>/<file>
//!   staging/                kubeconfig and other terraform outputs
//!   staging.dry-run/        fabricated outputs, secrets inspection file
//!   repos/<name>/           working clones of remote repositories
//!   repos.dry-run/<name>/   what a dry run would have committed
//!   logs/commands.json      command audit journal, one entry per run
//!   logs/commands.dry-run.json
//! ```
//!
//! External tools invoked by deployers find their inputs at these fixed
//! paths; nothing else records where an artifact lives. Everything a run
//! produces besides rendered artifacts is kept apart per mode, so a dry run
//! never replaces a real credential, working copy or journal.

use std::path::{Path, PathBuf};

use datastack_common::{PhaseId, ServiceId};

/// Computes every path the installer reads or writes under one root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    /// Dry runs keep their own state so a rendered-only completion is never
    /// taken for a real one.
    #[must_use]
    pub fn state_file(&self, dry_run: bool) -> PathBuf {
        if dry_run {
            self.root.join("state.dry-run.json")
        } else {
            self.root.join("state.json")
        }
    }

    #[must_use]
    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("artifacts")
    }

    #[must_use]
    pub fn phase_dir(&self, phase: PhaseId) -> PathBuf {
        self.artifacts_dir().join(phase.dir_name())
    }

    #[must_use]
    pub fn service_dir(&self, phase: PhaseId, service: &ServiceId) -> PathBuf {
        self.phase_dir(phase).join(service.as_str())
    }

    fn per_mode(&self, name: &str, dry_run: bool) -> PathBuf {
        if dry_run {
            self.root.join(format!("{name}.dry-run"))
        } else {
            self.root.join(name)
        }
    }

    /// Terraform outputs captured after apply.
    #[must_use]
    pub fn staging_dir(&self, dry_run: bool) -> PathBuf {
        self.per_mode("staging", dry_run)
    }

    /// The cluster-credential file shared by every cluster command of a mode.
    #[must_use]
    pub fn kubeconfig(&self, dry_run: bool) -> PathBuf {
        self.staging_dir(dry_run).join("kubeconfig")
    }

    /// Where a dry run writes the secrets it would have stored.
    #[must_use]
    pub fn secrets_inspection_file(&self) -> PathBuf {
        self.staging_dir(true).join("secrets.json")
    }

    #[must_use]
    pub fn repo_dir(&self, name: &str, dry_run: bool) -> PathBuf {
        self.per_mode("repos", dry_run).join(name)
    }

    #[must_use]
    pub fn journal_file(&self, dry_run: bool) -> PathBuf {
        let logs = self.root.join("logs");
        if dry_run {
            logs.join("commands.dry-run.json")
        } else {
            logs.join("commands.json")
        }
    }

    /// Path relative to the root with `/` separators, as stored in state.
    /// Paths outside the root are returned unchanged.
    #[must_use]
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}
