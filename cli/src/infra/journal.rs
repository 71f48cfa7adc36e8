//! Append-only command journal: a JSON array with one entry per run.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::domain::RunJournal;

/// Append `run` to the journal at `path`, creating it if absent.
///
/// The file is rewritten atomically. A journal that no longer parses is
/// moved aside with a timestamped name instead of being discarded.
///
/// # Errors
///
/// Returns an error if the journal cannot be read, moved aside, or written.
pub fn append_run(path: &Path, run: &RunJournal) -> Result<()> {
    let mut runs = load_runs(path)?;
    runs.push(run.clone());

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("creating directory {}", dir.display()))?;
    let content = serde_json::to_vec_pretty(&runs).context("serializing command journal")?;

    let mut temp = tempfile::Builder::new()
        .prefix(".commands-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    temp.write_all(&content).context("writing temp journal")?;
    temp.as_file().sync_all().context("syncing temp journal")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("setting permissions on {}", temp.path().display()))?;
    }
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("writing {}", path.display()))?;

    tracing::debug!(
        runs = runs.len(),
        commands = run.commands.len(),
        path = %path.display(),
        "command journal appended"
    );
    Ok(())
}

/// Runs recorded so far; empty when the journal does not exist yet.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, or if an
/// unparseable journal cannot be moved aside.
pub fn load_runs(path: &Path) -> Result<Vec<RunJournal>> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    match serde_json::from_slice(&raw) {
        Ok(runs) => Ok(runs),
        Err(e) => {
            let aside = path.with_extension(format!(
                "{}.unreadable.json",
                Utc::now().format("%Y%m%dT%H%M%S")
            ));
            std::fs::rename(path, &aside)
                .with_context(|| format!("moving {} aside", path.display()))?;
            tracing::warn!(
                error = %e,
                kept = %aside.display(),
                "command journal unreadable; starting a new one"
            );
            Ok(Vec::new())
        }
    }
}
