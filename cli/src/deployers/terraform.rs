//! Terraform stacks (phase 1 cloud infrastructure).

use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::application::deployer::DeployContext;
use crate::application::ports::{CommandExecutor, VaultBackend};
use crate::domain::{CommandSpec, FakeValue, ServiceResult};
use crate::infra::fs::write_private;

use super::path_arg;

/// A stack output captured to a staging file after apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerraformOutput {
    pub name: &'static str,
    /// File name under the staging directory of the run's mode.
    pub file: &'static str,
    /// What a dry run substitutes for the real output.
    pub fake: FakeValue,
}

/// A root module rendered from templates and applied in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformStack {
    pub outputs: &'static [TerraformOutput],
}

fn terraform<E: CommandExecutor, V: VaultBackend>(
    ctx: &DeployContext<'_, E, V>,
    dir: &Path,
) -> CommandSpec {
    CommandSpec::new("terraform")
        .arg(format!("-chdir={}", path_arg(dir)))
        .timeout(Duration::from_secs(ctx.config.timeouts.command_secs))
}

fn init<E: CommandExecutor, V: VaultBackend>(ctx: &DeployContext<'_, E, V>, dir: &Path) -> CommandSpec {
    terraform(ctx, dir).args(["init", "-input=false", "-no-color"])
}

pub(super) async fn apply<E: CommandExecutor, V: VaultBackend>(
    stack: &TerraformStack,
    ctx: &DeployContext<'_, E, V>,
    dir: &Path,
) -> Result<ServiceResult> {
    let mut result = ServiceResult::default();
    let long = Duration::from_secs(ctx.config.timeouts.infrastructure_secs);

    ctx.executor.execute(&init(ctx, dir)).await?;
    result.ok("terraform init");

    ctx.executor
        .execute(
            &terraform(ctx, dir)
                .args(["apply", "-auto-approve", "-input=false", "-no-color"])
                .timeout(long),
        )
        .await?;
    result.ok("terraform apply");

    for output in stack.outputs {
        let out = ctx
            .executor
            .execute(
                &terraform(ctx, dir)
                    .args(["output", "-raw", output.name])
                    .fabricate(output.fake),
            )
            .await?;
        let target = ctx.staging_dir().join(output.file);
        write_private(&target, &out.stdout)?;
        tracing::debug!(output = output.name, path = %target.display(), "captured terraform output");
        result.ok(format!("output {}", output.name));
    }
    Ok(result)
}

pub(super) async fn destroy<E: CommandExecutor, V: VaultBackend>(
    ctx: &DeployContext<'_, E, V>,
    dir: &Path,
) -> Result<ServiceResult> {
    let mut result = ServiceResult::default();
    ctx.executor.execute(&init(ctx, dir)).await?;
    ctx.executor
        .execute(
            &terraform(ctx, dir)
                .args(["destroy", "-auto-approve", "-input=false", "-no-color"])
                .timeout(Duration::from_secs(ctx.config.timeouts.infrastructure_secs)),
        )
        .await?;
    result.ok("terraform destroy");
    Ok(result)
}
