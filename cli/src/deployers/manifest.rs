//! Plain manifest bundles, applied file by file in sorted order and deleted
//! in reverse.

use std::path::PathBuf;

use anyhow::Result;

use crate::application::deployer::DeployContext;
use crate::application::ports::{CommandExecutor, VaultBackend};
use crate::domain::ServiceResult;

use super::{kubectl, path_arg};

fn manifests(artifacts: &[PathBuf]) -> impl DoubleEndedIterator<Item = &PathBuf> {
    artifacts
        .iter()
        .filter(|p| p.extension().is_some_and(|e| e == "yaml" || e == "yml"))
}

pub(super) async fn apply<E: CommandExecutor, V: VaultBackend>(
    ctx: &DeployContext<'_, E, V>,
    artifacts: &[PathBuf],
) -> Result<ServiceResult> {
    let mut result = ServiceResult::default();
    for manifest in manifests(artifacts) {
        ctx.executor
            .execute(&kubectl(ctx).args(["apply", "-f", path_arg(manifest).as_str()]))
            .await?;
        result.ok(ctx.layout.relative(manifest));
    }
    Ok(result)
}

pub(super) async fn destroy<E: CommandExecutor, V: VaultBackend>(
    ctx: &DeployContext<'_, E, V>,
    artifacts: &[PathBuf],
) -> Result<ServiceResult> {
    let mut result = ServiceResult::default();
    for manifest in manifests(artifacts).rev() {
        ctx.executor
            .execute(&kubectl(ctx).args([
                "delete",
                "--ignore-not-found",
                "-f",
                path_arg(manifest).as_str(),
            ]))
            .await?;
        result.ok(format!("deleted {}", ctx.layout.relative(manifest)));
    }
    Ok(result)
}
