//! Infrastructure implementation of the `StateStore` port.
//!
//! `JsonStateStore` keeps the deployment state as pretty JSON. Saves are
//! atomic: the new content is written to a temp file in the same directory,
//! synced, then renamed over the target, so a reader sees either the old or
//! the new file and never a partial one.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use datastack_common::DeploymentState;

use crate::application::ports::StateStore;
use crate::domain::DeployError;

const TEMP_SUFFIX: &str = ".tmp";

/// State file manager for one working directory and mode.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `.state.json-` for `state.json`; each state file sweeps only its own
    /// leftovers.
    fn temp_prefix(path: &Path) -> String {
        let name = path
            .file_name()
            .map_or_else(|| "state".into(), |n| n.to_string_lossy().into_owned());
        format!(".{name}-")
    }

    fn state_dir(path: &Path) -> PathBuf {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Remove temp files a killed save left behind. Failures only log: a
    /// stray temp file never makes the state itself unreadable.
    fn sweep_temp_files(path: &Path) {
        let prefix = Self::temp_prefix(path);
        let Ok(entries) = std::fs::read_dir(Self::state_dir(path)) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(TEMP_SUFFIX) {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => tracing::debug!(file = %name, "removed stale state temp file"),
                    Err(e) => tracing::warn!(file = %name, error = %e, "cannot remove stale state temp file"),
                }
            }
        }
    }

    fn load_sync(path: &Path) -> Result<Option<DeploymentState>> {
        Self::sweep_temp_files(path);
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading state file {}", path.display()));
            }
        };
        // Unknown phase keys, invalid service ids and malformed JSON all fail
        // here; the file is never partially trusted.
        let state: DeploymentState =
            serde_json::from_str(&content).map_err(|e| DeployError::StateCorruption {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(Some(state))
    }

    fn save_sync(path: &Path, state: &DeploymentState) -> Result<()> {
        let dir = Self::state_dir(path);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating directory {}", dir.display()))?;
        let content = serde_json::to_string_pretty(state).context("serializing state")?;

        let mut temp = tempfile::Builder::new()
            .prefix(&Self::temp_prefix(path))
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        temp.write_all(content.as_bytes())
            .context("writing temp state file")?;
        temp.write_all(b"\n").context("writing temp state file")?;
        temp.as_file().sync_all().context("syncing temp state file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("setting permissions on {}", temp.path().display()))?;
        }

        // A failed persist drops the temp file, which deletes it.
        temp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("finalizing state file {}", path.display()))?;
        Ok(())
    }
}

impl StateStore for JsonStateStore {
    async fn load(&self) -> Result<Option<DeploymentState>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::load_sync(&path))
            .await
            .context("state load task panicked")?
    }

    async fn save(&self, state: &DeploymentState) -> Result<()> {
        let path = self.path.clone();
        let state = state.clone();
        tokio::task::spawn_blocking(move || Self::save_sync(&path, &state))
            .await
            .context("state save task panicked")?
    }

    async fn clear(&self) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing state file {}", path.display())),
        })
        .await
        .context("state clear task panicked")?
    }
}
