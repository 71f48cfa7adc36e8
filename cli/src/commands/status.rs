//! `datastack status`: what the state file says, joined with the registry.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::StateStore;
use crate::application::services::deployment::status_view;
use crate::deployers::REGISTRY;
use crate::infra::state::JsonStateStore;

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show the dry-run state instead of the real one
    #[arg(long)]
    pub dry_run: bool,
}

/// Run `datastack status`.
///
/// # Errors
///
/// Returns `DeployError::StateCorruption` if the state file cannot be parsed.
pub async fn run(app: &AppContext, args: &StatusArgs) -> Result<()> {
    let store = JsonStateStore::new(app.layout.state_file(args.dry_run));
    let Some(state) = store.load().await? else {
        if app.is_json() {
            crate::output::json::print(&serde_json::json!({ "deployed": false }))?;
        } else {
            app.output.info(&format!(
                "no deployment recorded in {}",
                app.layout.root().display()
            ));
            app.output.info("Start one: datastack deploy");
        }
        return Ok(());
    };
    app.renderer().render_status(&status_view(&state, REGISTRY))
}
