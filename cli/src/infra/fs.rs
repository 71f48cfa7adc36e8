//! Filesystem infrastructure: implements `LocalArtifactWriter` and the raw
//! file operations deployers need for repository working copies.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::LocalArtifactWriter;

/// Production filesystem implementation of `LocalArtifactWriter`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl LocalArtifactWriter for LocalFs {
    fn write_artifact(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating artifact dir {}", parent.display()))?;
        }
        // Rewriting identical bytes would only bump mtimes.
        if std::fs::read(path).is_ok_and(|existing| existing == content) {
            return Ok(());
        }
        std::fs::write(path, content)
            .with_context(|| format!("writing artifact {}", path.display()))
    }

    fn prune(&self, dir: &Path, keep: &[PathBuf]) -> Result<()> {
        if !dir.is_dir() {
            return Ok(());
        }
        for file in list_files(dir)? {
            if !keep.contains(&file) {
                tracing::debug!(path = %file.display(), "removing stale artifact");
                std::fs::remove_file(&file)
                    .with_context(|| format!("removing stale artifact {}", file.display()))?;
            }
        }
        Ok(())
    }
}

/// Every regular file under `dir`, recursively, in sorted order.
///
/// # Errors
///
/// Returns an error if a directory cannot be listed.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in
            std::fs::read_dir(&current).with_context(|| format!("listing {}", current.display()))?
        {
            let entry = entry.with_context(|| format!("listing {}", current.display()))?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Replace `dest` with a copy of the `src` tree.
///
/// # Errors
///
/// Returns an error if any file cannot be copied.
pub fn replace_tree(src: &Path, dest: &Path) -> Result<()> {
    remove_dir_if_exists(dest)?;
    std::fs::create_dir_all(dest).with_context(|| format!("creating {}", dest.display()))?;
    if !src.is_dir() {
        return Ok(());
    }
    for file in list_files(src)? {
        let relative = file.strip_prefix(src).unwrap_or(&file);
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::copy(&file, &target)
            .with_context(|| format!("copying {} to {}", file.display(), target.display()))?;
    }
    Ok(())
}

/// Remove a directory tree; a missing directory is not an error.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", dir.display())),
    }
}

/// Write a file readable only by the current user (credentials, keys).
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_private(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("setting permissions on {}", path.display()))?;
    }
    Ok(())
}
