//! Helm releases. `values.yaml` feeds the chart; any other rendered YAML is
//! applied with kubectl after the release is up (issuers, root apps).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use crate::application::deployer::DeployContext;
use crate::application::ports::{CommandExecutor, VaultBackend};
use crate::domain::{CommandSpec, ServiceResult};

use super::{kubectl, path_arg};

const VALUES_FILE: &str = "values.yaml";

/// A classic chart repository. OCI charts have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelmRepo {
    pub name: &'static str,
    pub url: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelmRelease {
    pub repo: Option<HelmRepo>,
    /// `repo/chart` or an `oci://` reference.
    pub chart: &'static str,
    pub namespace: &'static str,
    /// Default chart version; config `charts.<service>` overrides it.
    pub version: &'static str,
}

fn helm<E: CommandExecutor, V: VaultBackend>(ctx: &DeployContext<'_, E, V>) -> CommandSpec {
    CommandSpec::new("helm")
        .arg("--kubeconfig")
        .arg(path_arg(&ctx.kubeconfig()))
        .timeout(Duration::from_secs(ctx.config.timeouts.command_secs + 60))
}

fn split_artifacts(artifacts: &[PathBuf]) -> (Option<&PathBuf>, Vec<&PathBuf>) {
    let values = artifacts
        .iter()
        .find(|p| p.file_name().is_some_and(|n| n == VALUES_FILE));
    let extras = artifacts
        .iter()
        .filter(|p| {
            p.file_name().is_some_and(|n| n != VALUES_FILE)
                && p.extension().is_some_and(|e| e == "yaml")
        })
        .collect();
    (values, extras)
}

pub(super) async fn apply<E: CommandExecutor, V: VaultBackend>(
    release: &str,
    spec: &HelmRelease,
    version: &str,
    ctx: &DeployContext<'_, E, V>,
    artifacts: &[PathBuf],
) -> Result<ServiceResult> {
    let mut result = ServiceResult::default();
    let (values, extras) = split_artifacts(artifacts);

    if let Some(repo) = spec.repo {
        ctx.executor
            .execute(&helm(ctx).args(["repo", "add", repo.name, repo.url, "--force-update"]))
            .await?;
        result.ok(format!("helm repo {}", repo.name));
    }

    let wait_timeout = format!("{}s", ctx.config.timeouts.command_secs);
    let mut install = helm(ctx).args([
        "upgrade",
        "--install",
        release,
        spec.chart,
        "--namespace",
        spec.namespace,
        "--create-namespace",
        "--version",
        version,
        "--wait",
        "--timeout",
        wait_timeout.as_str(),
    ]);
    if let Some(values) = values {
        install = install.arg("--values").arg(path_arg(values));
    }
    ctx.executor.execute(&install).await?;
    result.ok(format!("release {release}@{version}"));

    for manifest in extras {
        apply_manifest(ctx, manifest).await?;
        result.ok(display_name(manifest));
    }
    Ok(result)
}

pub(super) async fn destroy<E: CommandExecutor, V: VaultBackend>(
    release: &str,
    spec: &HelmRelease,
    ctx: &DeployContext<'_, E, V>,
    artifacts: &[PathBuf],
) -> Result<ServiceResult> {
    let mut result = ServiceResult::default();
    let (_, extras) = split_artifacts(artifacts);
    for manifest in extras.iter().rev() {
        ctx.executor
            .execute(&kubectl(ctx).args([
                "delete",
                "--ignore-not-found",
                "-f",
                path_arg(manifest).as_str(),
            ]))
            .await?;
        result.ok(format!("deleted {}", display_name(manifest)));
    }
    ctx.executor
        .execute(&helm(ctx).args([
            "uninstall",
            release,
            "--namespace",
            spec.namespace,
            "--ignore-not-found",
            "--wait",
        ]))
        .await?;
    result.ok(format!("uninstalled {release}"));
    Ok(result)
}

async fn apply_manifest<E: CommandExecutor, V: VaultBackend>(
    ctx: &DeployContext<'_, E, V>,
    manifest: &Path,
) -> Result<()> {
    ctx.executor
        .execute(&kubectl(ctx).args(["apply", "-f", path_arg(manifest).as_str()]))
        .await?;
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
