//! Deployment record: the rendered artifact tree, encrypted file by file and
//! pushed to the artifacts repository.
//!
//! The key is generated for this run only. It is shown to the operator once
//! and stored in the vault backend, and never enters the repository.

use std::path::Path;

use anyhow::{Context, Result};
use datastack_common::encryption_key_path;
use serde::Serialize;

use crate::application::deployer::DeployContext;
use crate::application::ports::{CommandExecutor, VaultBackend};
use crate::domain::{EncryptedTree, EncryptionKey, SecretValue, ServiceResult};
use crate::infra::encryption::EncryptionService;
use crate::infra::fs::{remove_dir_if_exists, replace_tree};

use super::repository::{RepoRemote, commit_and_push, sync_clone};

const MANIFEST_FILE: &str = "encryption.json";

/// `encryption.json` at the top of the record; lists what was sealed.
#[derive(Debug, Serialize)]
struct RecordManifest<'a> {
    key_fingerprint: &'a str,
    algorithm: &'static str,
    encrypted: Vec<String>,
    skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Serialize)]
struct SkippedEntry {
    path: String,
    reason: String,
}

fn manifest_json(root: &Path, fingerprint: &str, tree: &EncryptedTree) -> Result<String> {
    let relative = |p: &Path| {
        p.strip_prefix(root)
            .unwrap_or(p)
            .to_string_lossy()
            .replace('\\', "/")
    };
    let manifest = RecordManifest {
        key_fingerprint: fingerprint,
        algorithm: "chacha20-poly1305",
        encrypted: tree
            .artifacts
            .iter()
            .map(|a| relative(&a.ciphertext_path))
            .collect(),
        skipped: tree
            .skipped
            .iter()
            .map(|s| SkippedEntry {
                path: relative(&s.path),
                reason: s.reason.clone(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&manifest).context("serializing record manifest")
}

pub(super) async fn apply<E: CommandExecutor, V: VaultBackend>(
    ctx: &DeployContext<'_, E, V>,
) -> Result<ServiceResult> {
    let mut result = ServiceResult::default();
    let remote = RepoRemote::Artifacts;
    let url = remote.url(&ctx.config.repositories);
    let clone = ctx.repo_dir(remote.dir_name());
    let record = clone.join(&ctx.config.customer).join("artifacts");

    sync_clone(ctx, url, &clone).await?;
    replace_tree(&ctx.layout.artifacts_dir(), &record)?;

    let key = EncryptionKey::generate();
    let fingerprint = key.fingerprint();
    let tree = EncryptionService.encrypt_tree(&record, &key)?;
    result.ok(format!(
        "encrypted {} files ({} skipped)",
        tree.artifacts.len(),
        tree.skipped.len()
    ));

    let manifest = manifest_json(&record, &fingerprint, &tree)?;
    let manifest_path = clone.join(&ctx.config.customer).join(MANIFEST_FILE);
    std::fs::write(&manifest_path, manifest)
        .with_context(|| format!("writing {}", manifest_path.display()))?;

    let _tunnel = super::tunnel::open(ctx).await?;
    ctx.secrets
        .store_value(
            &encryption_key_path(&ctx.config.customer),
            SecretValue::new(key.to_base64()),
        )
        .await?;
    ctx.reporter.reveal(
        &format!("Artifact encryption key (fingerprint {fingerprint}), shown once"),
        &key.to_base64(),
    );
    result.ok(format!("key {fingerprint} stored"));

    let message = format!(
        "datastack: deployment record for {} (key {fingerprint})",
        ctx.config.customer
    );
    commit_and_push(ctx, &clone, &message).await?;
    result.ok(format!("pushed record to {url}"));
    Ok(result)
}

/// Drops the local working copy. The pushed record is history and stays.
pub(super) fn destroy<E: CommandExecutor, V: VaultBackend>(
    ctx: &DeployContext<'_, E, V>,
) -> Result<ServiceResult> {
    let mut result = ServiceResult::default();
    let clone = ctx.repo_dir(RepoRemote::Artifacts.dir_name());
    remove_dir_if_exists(&clone)?;
    result.ok(format!("removed {}", ctx.layout.relative(&clone)));
    Ok(result)
}
