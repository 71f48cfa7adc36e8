//! Command implementations

pub mod decrypt;
pub mod deploy;
pub mod destroy;
pub mod status;
pub mod version;

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use datastack_common::PhaseId;

use crate::app::AppContext;
use crate::application::Executor;
use crate::application::ports::CommandExecutor;
use crate::application::services::secrets::SecretsManager;
use crate::domain::{PlatformConfig, RunJournal, RunKind};
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::config::load_config;
use crate::infra::fs::LocalFs;
use crate::infra::journal::append_run;
use crate::infra::state::JsonStateStore;
use crate::infra::vault::ConfiguredVault;

/// Phase and mode flags shared by `deploy` and `destroy`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Phase to include (1-6); repeat for several. Default: all phases
    #[arg(long = "phase", value_name = "N", value_parser = clap::value_parser!(u8).range(1..=6))]
    pub phases: Vec<u8>,

    /// Render everything, execute nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Configuration file (default: <workdir>/config.yaml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl RunArgs {
    /// Selected phases as ids; empty means all.
    ///
    /// # Errors
    ///
    /// Returns an error for a phase number outside 1..=6.
    pub fn phase_set(&self) -> Result<BTreeSet<PhaseId>> {
        self.phases
            .iter()
            .map(|n| PhaseId::try_from(*n).map_err(anyhow::Error::from))
            .collect()
    }

    #[must_use]
    pub fn config_path(&self, app: &AppContext) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| app.layout.config_file())
    }
}

/// Concrete adapters for one deploy or destroy invocation.
pub struct Session {
    pub config: PlatformConfig,
    pub executor: Executor<TokioCommandRunner>,
    pub secrets: SecretsManager<ConfiguredVault>,
    pub store: JsonStateStore,
    pub fs: LocalFs,
    started_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn open(app: &AppContext, config: PlatformConfig, dry_run: bool) -> Self {
        let layout = &app.layout;
        let secrets = SecretsManager::new(
            ConfiguredVault::from_config(&config.vault),
            config.customer.clone(),
            dry_run,
            layout.secrets_inspection_file(),
        );
        Self {
            executor: Executor::new(TokioCommandRunner::new(), dry_run),
            secrets,
            store: JsonStateStore::new(layout.state_file(dry_run)),
            fs: LocalFs,
            config,
            started_at: Utc::now(),
        }
    }

    /// Append this run's commands to the journal of its mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be serialized or written.
    pub fn write_journal(&self, app: &AppContext, kind: RunKind) -> Result<()> {
        let dry_run = self.executor.is_dry_run();
        let run = RunJournal {
            kind,
            dry_run,
            started_at: self.started_at,
            finished_at: Utc::now(),
            commands: self.executor.journal(),
        };
        append_run(&app.layout.journal_file(dry_run), &run)
    }
}

/// Load the configuration a run will use.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_run_config(app: &AppContext, args: &RunArgs) -> Result<PlatformConfig> {
    let config = load_config(&args.config_path(app))?;
    crate::deployers::validate_chart_overrides(&config)?;
    Ok(config)
}
