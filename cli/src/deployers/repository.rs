//! Git repositories the platform reads from: the GitOps tree Argo CD syncs
//! and the DAGs repository Airflow pulls.
//!
//! All git traffic goes through the executor, so a dry run clones nothing and
//! pushes nothing. The local working copies live under `<workdir>/repos/`;
//! a dry run uses `<workdir>/repos.dry-run/` and never touches them.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use datastack_common::secret_path;

use crate::application::deployer::DeployContext;
use crate::application::ports::{CommandExecutor, VaultBackend};
use crate::domain::config::RepositoryConfig;
use crate::domain::{CommandSpec, ServiceResult};
use crate::infra::fs::{remove_dir_if_exists, replace_tree};

use super::{path_arg, tunnel};

const COMMIT_NAME: &str = "datastack";
const COMMIT_EMAIL: &str = "installer@datastack.invalid";

/// Which configured remote a unit works against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoRemote {
    Gitops,
    Dags,
    /// Deployment record holding the encrypted artifact bundle.
    Artifacts,
}

impl RepoRemote {
    #[must_use]
    pub fn url(self, repos: &RepositoryConfig) -> &str {
        match self {
            Self::Gitops => &repos.gitops_url,
            Self::Dags => &repos.dags_url,
            Self::Artifacts => &repos.artifacts_url,
        }
    }

    /// Directory name of the working copy.
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Gitops => "gitops",
            Self::Dags => "dags",
            Self::Artifacts => "deployment-record",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoMode {
    /// Commit the rendered tree under `<customer>/` and push.
    Publish,
    /// Check the remote is reachable and hand the operator the deploy key.
    Verify,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryUnit {
    pub remote: RepoRemote,
    pub mode: RepoMode,
}

// ── git command helpers ─────────────────────────────────────────────────────

fn git<E: CommandExecutor, V: VaultBackend>(ctx: &DeployContext<'_, E, V>) -> CommandSpec {
    CommandSpec::new("git").timeout(Duration::from_secs(ctx.config.timeouts.command_secs))
}

fn in_repo<E: CommandExecutor, V: VaultBackend>(
    ctx: &DeployContext<'_, E, V>,
    dir: &Path,
) -> CommandSpec {
    git(ctx).arg("-C").arg(path_arg(dir))
}

/// Bring the working copy at `dir` up to date with the remote branch,
/// cloning it if there is none.
///
/// # Errors
///
/// Returns an error if any git command fails.
pub(super) async fn sync_clone<E: CommandExecutor, V: VaultBackend>(
    ctx: &DeployContext<'_, E, V>,
    url: &str,
    dir: &Path,
) -> Result<()> {
    let branch = ctx.config.repositories.branch.as_str();
    if dir.join(".git").is_dir() {
        ctx.executor
            .execute(&in_repo(ctx, dir).args(["fetch", "--depth", "1", "origin", branch]))
            .await?;
        let target = format!("origin/{branch}");
        ctx.executor
            .execute(&in_repo(ctx, dir).args(["reset", "--hard", target.as_str()]))
            .await?;
    } else {
        // A clone interrupted before .git existed would block a fresh one.
        remove_dir_if_exists(dir)?;
        ctx.executor
            .execute(
                &git(ctx)
                    .args(["clone", "--branch", branch, "--depth", "1", url])
                    .arg(path_arg(dir)),
            )
            .await?;
    }
    Ok(())
}

/// Stage everything, commit and push to the configured branch.
///
/// # Errors
///
/// Returns an error if any git command fails.
pub(super) async fn commit_and_push<E: CommandExecutor, V: VaultBackend>(
    ctx: &DeployContext<'_, E, V>,
    dir: &Path,
    message: &str,
) -> Result<()> {
    let author_name = format!("user.name={COMMIT_NAME}");
    let author_email = format!("user.email={COMMIT_EMAIL}");
    let refspec = format!("HEAD:{}", ctx.config.repositories.branch);
    ctx.executor.execute(&in_repo(ctx, dir).args(["add", "-A"])).await?;
    ctx.executor
        .execute(&in_repo(ctx, dir).args([
            "-c",
            author_name.as_str(),
            "-c",
            author_email.as_str(),
            "commit",
            "--allow-empty",
            "-m",
            message,
        ]))
        .await?;
    ctx.executor
        .execute(&in_repo(ctx, dir).args(["push", "origin", refspec.as_str()]))
        .await?;
    Ok(())
}

// ── unit operations ─────────────────────────────────────────────────────────

pub(super) async fn apply<E: CommandExecutor, V: VaultBackend>(
    unit: &RepositoryUnit,
    ctx: &DeployContext<'_, E, V>,
    rendered: &Path,
) -> Result<ServiceResult> {
    match unit.mode {
        RepoMode::Publish => publish(unit.remote, ctx, rendered).await,
        RepoMode::Verify => verify(unit.remote, ctx).await,
    }
}

async fn publish<E: CommandExecutor, V: VaultBackend>(
    remote: RepoRemote,
    ctx: &DeployContext<'_, E, V>,
    rendered: &Path,
) -> Result<ServiceResult> {
    let mut result = ServiceResult::default();
    let url = remote.url(&ctx.config.repositories);
    let clone = ctx.repo_dir(remote.dir_name());

    sync_clone(ctx, url, &clone).await?;
    result.ok(format!("synced {url}"));

    replace_tree(rendered, &clone.join(&ctx.config.customer))?;
    let message = format!("datastack: update {} platform definitions", ctx.config.customer);
    commit_and_push(ctx, &clone, &message).await?;
    result.ok(format!("pushed {}", ctx.config.repositories.branch));
    Ok(result)
}

async fn verify<E: CommandExecutor, V: VaultBackend>(
    remote: RepoRemote,
    ctx: &DeployContext<'_, E, V>,
) -> Result<ServiceResult> {
    let mut result = ServiceResult::default();
    let url = remote.url(&ctx.config.repositories);
    ctx.executor
        .execute(&git(ctx).args([
            "ls-remote",
            "--exit-code",
            "--heads",
            url,
            ctx.config.repositories.branch.as_str(),
        ]))
        .await?;
    result.ok(format!("reachable {url}"));

    let _tunnel = tunnel::open(ctx).await?;
    let key_path = secret_path(&ctx.config.customer, "airflow", "dags-deploy-key-pub");
    let public_key = ctx.secrets.fetch(&key_path).await?;
    ctx.reporter
        .reveal("Add this read-only deploy key to the DAGs repository", public_key.expose());
    result.ok("deploy key issued");
    Ok(result)
}

/// Only the local working copy is removed; remote history is left alone.
pub(super) fn destroy<E: CommandExecutor, V: VaultBackend>(
    unit: &RepositoryUnit,
    ctx: &DeployContext<'_, E, V>,
) -> Result<ServiceResult> {
    let mut result = ServiceResult::default();
    if unit.mode == RepoMode::Publish {
        let clone = ctx.repo_dir(unit.remote.dir_name());
        remove_dir_if_exists(&clone)?;
        result.ok(format!("removed {}", ctx.layout.relative(&clone)));
    }
    result.ok(format!("left {} untouched", unit.remote.url(&ctx.config.repositories)));
    Ok(result)
}
