//! `datastack deploy`: run the requested phases, optionally resuming.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::Args;
use datastack_common::CloudProvider;
use dialoguer::{Input, Select};

use crate::app::AppContext;
use crate::application::deployer::DeployContext;
use crate::application::renderer::TemplateRenderer;
use crate::application::services::deployment::DeploymentManager;
use crate::assets::TEMPLATES;
use crate::commands::{RunArgs, Session, load_run_config};
use crate::deployers::REGISTRY;
use crate::domain::config::{
    ClusterConfig, RepositoryConfig, TimeoutConfig, validate_config, validate_customer,
};
use crate::domain::{DeployError, PlatformConfig, RunKind, VaultConfig};
use crate::infra::config::save_config;
use crate::output::TerminalReporter;

/// Arguments for the deploy command.
#[derive(Args, Debug)]
pub struct DeployArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Skip services already completed by an earlier run
    #[arg(long)]
    pub resume: bool,

    /// Create the configuration by answering prompts, then deploy
    #[arg(long)]
    pub interactive: bool,
}

/// Run `datastack deploy`. Returns the process exit code.
///
/// # Errors
///
/// Returns an error for configuration problems, unreadable state, or a
/// journal that cannot be written. Service failures are reported in the
/// result and the exit code instead.
pub async fn run(app: &AppContext, args: &DeployArgs, cancel: &AtomicBool) -> Result<i32> {
    let phases = args.run.phase_set()?;
    if args.interactive {
        if app.non_interactive {
            return Err(DeployError::config(
                "--interactive needs a terminal",
                "drop --yes / unset CI, or pass --config FILE",
            )
            .into());
        }
        let config = prompt_config()?;
        let path = args.run.config_path(app);
        save_config(&path, &config)?;
        app.output
            .success(&format!("configuration saved to {}", path.display()));
    }
    let config = load_run_config(app, &args.run)?;

    let session = Session::open(app, config, args.run.dry_run);
    let renderer = TemplateRenderer::new(&TEMPLATES, &session.fs);
    let reporter = TerminalReporter::new(&app.output);
    let ctx = DeployContext {
        config: &session.config,
        layout: &app.layout,
        executor: &session.executor,
        secrets: &session.secrets,
        renderer: &renderer,
        reporter: &reporter,
    };
    if ctx.dry_run() {
        app.output
            .info("dry run: artifacts are rendered, no command is executed");
    }

    let manager = DeploymentManager::new(&session.store, &ctx, REGISTRY, cancel);
    let outcome = manager.run(&phases, args.resume).await;
    drop(reporter);
    session.write_journal(app, RunKind::Deploy)?;

    let result = outcome?;
    app.renderer().render_result(&result)?;
    Ok(result.exit_code())
}

// ── Interactive configuration ───────────────────────────────────────────────

fn prompt_config() -> Result<PlatformConfig> {
    let customer: String = Input::new()
        .with_prompt("Customer id (lowercase, digits, dashes)")
        .validate_with(|s: &String| validate_customer(s).map_err(|e| e.to_string()))
        .interact_text()
        .context("customer prompt")?;

    let providers = [CloudProvider::Aws, CloudProvider::Gcp, CloudProvider::Azure];
    let provider_idx = Select::new()
        .with_prompt("Cloud provider")
        .items(&providers.map(|p| p.to_string()))
        .default(0)
        .interact()
        .context("provider selection")?;
    let cloud_provider = providers[provider_idx];

    let region = text("Region", Some(default_region(cloud_provider)))?;
    let domain = text("Base DNS domain (services get <name>.<domain>)", None)?;

    let vault = if Select::new()
        .with_prompt("Secrets backend")
        .items(&["vault deployed in the cluster", "external secrets service"])
        .default(0)
        .interact()
        .context("vault selection")?
        == 0
    {
        VaultConfig::InCluster {
            address: "http://127.0.0.1:8200".to_string(),
            token_env: text("Env var holding the vault token", Some("VAULT_TOKEN"))?,
        }
    } else {
        VaultConfig::External {
            api_url: text("API URL", None)?,
            client_id_env: text("Env var holding the client id", Some("VAULT_CLIENT_ID"))?,
            client_secret_env: text(
                "Env var holding the client secret",
                Some("VAULT_CLIENT_SECRET"),
            )?,
            project_id: text("Project id", None)?,
            environment: text("Environment", Some("prod"))?,
        }
    };

    let repositories = RepositoryConfig {
        gitops_url: text("GitOps repository URL", None)?,
        dags_url: text("DAGs repository URL", None)?,
        artifacts_url: text("Deployment record repository URL", None)?,
        branch: text("Branch", Some("main"))?,
    };

    let config = PlatformConfig {
        customer,
        cloud_provider,
        region,
        domain,
        vault,
        repositories,
        cluster: ClusterConfig::default(),
        charts: BTreeMap::new(),
        timeouts: TimeoutConfig::default(),
    };
    validate_config(&config)?;
    Ok(config)
}

fn text(prompt: &str, default: Option<&str>) -> Result<String> {
    let mut input = Input::<String>::new().with_prompt(prompt);
    if let Some(default) = default {
        input = input.default(default.to_string());
    }
    input
        .interact_text()
        .with_context(|| format!("prompt '{prompt}'"))
}

fn default_region(provider: CloudProvider) -> &'static str {
    match provider {
        CloudProvider::Aws => "eu-west-1",
        CloudProvider::Gcp => "europe-west1",
        CloudProvider::Azure => "westeurope",
    }
}
