//! Encrypts and decrypts artifact trees in place before they are committed.
//!
//! Each file is sealed on its own with its path relative to the tree root as
//! associated data, so files cannot be swapped or renamed undetected.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::crypto::{self, ENCRYPTED_EXTENSION, skip_reason};
use crate::domain::{DeployError, EncryptedArtifact, EncryptedTree, EncryptionKey, SkippedFile};

/// Stateless tree walker over [`crate::domain::crypto`].
#[derive(Debug, Default, Clone, Copy)]
pub struct EncryptionService;

impl EncryptionService {
    /// Encrypt every eligible file under `root`, replacing `<file>` with
    /// `<file>.enc`. Non-sensitive, empty and already-encrypted files are
    /// left alone and listed in `skipped`.
    ///
    /// Nothing is touched when an eligible `<file>` already has a
    /// `<file>.enc` sibling.
    ///
    /// # Errors
    ///
    /// Returns an error on a name collision, or on the first file that
    /// cannot be read, sealed or written. Files processed before a write
    /// failure stay encrypted.
    pub fn encrypt_tree(&self, root: &Path, key: &EncryptionKey) -> Result<EncryptedTree> {
        let fingerprint = key.fingerprint();
        let mut tree = EncryptedTree::default();

        let files = walk(root)?;
        let present: BTreeSet<&PathBuf> = files.iter().collect();
        let mut eligible = Vec::new();
        for path in &files {
            let data =
                std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if let Some(reason) = skip_reason(&name, &data) {
                tracing::debug!(path = %path.display(), reason, "not encrypting");
                tree.skipped.push(SkippedFile {
                    path: path.clone(),
                    reason: reason.to_string(),
                });
                continue;
            }
            let target = encrypted_path(path);
            if present.contains(&target) {
                return Err(collision(root, path, &target).into());
            }
            eligible.push((path.clone(), target, data));
        }

        for (path, target, data) in eligible {
            let aad = relative_aad(root, &path);
            let sealed = crypto::encrypt(key, &data, aad.as_bytes())
                .with_context(|| format!("encrypting {}", path.display()))?;
            write_private(&target, &sealed)?;
            std::fs::remove_file(&path)
                .with_context(|| format!("removing plaintext {}", path.display()))?;
            tree.artifacts.push(EncryptedArtifact {
                plaintext_path: path,
                ciphertext_path: target,
                key_fingerprint: fingerprint.clone(),
            });
        }

        tracing::info!(
            encrypted = tree.artifacts.len(),
            skipped = tree.skipped.len(),
            fingerprint = %fingerprint,
            "artifact tree encrypted"
        );
        Ok(tree)
    }

    /// Exact inverse of [`EncryptionService::encrypt_tree`]: restores every
    /// `<file>.enc` under `root` to `<file>`.
    ///
    /// Returns the restored plaintext paths.
    ///
    /// # Errors
    ///
    /// Returns an error if a restored file would replace an existing one, or
    /// if any file fails authentication (wrong key, moved or modified file).
    pub fn decrypt_tree(&self, root: &Path, key: &EncryptionKey) -> Result<Vec<PathBuf>> {
        let mut sealed = Vec::new();
        for path in walk(root)? {
            if path.extension().and_then(|e| e.to_str()) != Some(ENCRYPTED_EXTENSION) {
                continue;
            }
            let data =
                std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            if !crypto::is_encrypted(&data) {
                continue;
            }
            let plain_path = path.with_extension("");
            if plain_path.exists() {
                return Err(collision(root, &plain_path, &path).into());
            }
            sealed.push((path, plain_path, data));
        }

        let mut restored = Vec::new();
        for (path, plain_path, data) in sealed {
            let aad = relative_aad(root, &plain_path);
            let plain = crypto::decrypt(key, &data, aad.as_bytes())
                .with_context(|| format!("decrypting {}", path.display()))?;
            write_private(&plain_path, &plain)?;
            std::fs::remove_file(&path)
                .with_context(|| format!("removing {}", path.display()))?;
            restored.push(plain_path);
        }
        tracing::info!(restored = restored.len(), "artifact tree decrypted");
        Ok(restored)
    }
}

fn collision(root: &Path, plain: &Path, sealed: &Path) -> DeployError {
    DeployError::config(
        format!(
            "{} and {} both exist",
            relative_aad(root, plain),
            relative_aad(root, sealed)
        ),
        "rename or remove one of them; the tree was left unchanged",
    )
}

/// `<file>` → `<file>.enc`, keeping any existing extension.
fn encrypted_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(ENCRYPTED_EXTENSION);
    PathBuf::from(os)
}

fn relative_aad(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Every regular file under `root` in sorted order, skipping `.git`.
fn walk(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries =
            std::fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                if entry.file_name() != ".git" {
                    pending.push(path);
                }
            } else if file_type.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("setting permissions on {}", path.display()))?;
    }
    Ok(())
}
