//! `datastack destroy`: tear down the requested phases, latest first.

use std::sync::atomic::AtomicBool;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::deployer::DeployContext;
use crate::application::renderer::TemplateRenderer;
use crate::application::services::deployment::{DeploymentManager, resolve_phases};
use crate::assets::TEMPLATES;
use crate::commands::{RunArgs, Session, load_run_config};
use crate::deployers::REGISTRY;
use crate::domain::RunKind;
use crate::output::TerminalReporter;

/// Arguments for the destroy command.
#[derive(Args, Debug)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub run: RunArgs,
}

/// Run `datastack destroy`. Returns the process exit code.
///
/// # Errors
///
/// Returns an error for configuration problems or unreadable state. Unit
/// failures are collected in the result; every unit is still attempted.
pub async fn run(app: &AppContext, args: &DestroyArgs, cancel: &AtomicBool) -> Result<i32> {
    let phases = args.run.phase_set()?;
    let config = load_run_config(app, &args.run)?;

    if !args.run.dry_run {
        let listed: Vec<String> = resolve_phases(&phases)
            .iter()
            .rev()
            .map(ToString::to_string)
            .collect();
        if !app.output.quiet {
            println!();
            println!("This will destroy, for customer '{}':", config.customer);
            for phase in &listed {
                println!("  • {phase}");
            }
            println!();
        }
        if !app.confirm("Continue?")? {
            app.output.info("Cancelled.");
            return Ok(0);
        }
    }

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

    let manager = DeploymentManager::new(&session.store, &ctx, REGISTRY, cancel);
    let outcome = manager.destroy(&phases).await;
    drop(reporter);
    session.write_journal(app, RunKind::Destroy)?;

    let result = outcome?;
    app.renderer().render_result(&result)?;
    Ok(result.exit_code())
}
