//! CLI argument parsing with clap derive

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, GlobalFlags};
use crate::commands;

/// Phased, resumable installer for a multi-cloud data platform
#[derive(Parser)]
#[command(
    name = "datastack",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output (`NO_COLOR` is honoured too)
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Debug logging on stderr (`RUST_LOG` overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer yes to every prompt
    #[arg(
        short,
        long,
        global = true,
        env = "DATASTACK_YES",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub yes: bool,

    /// Working directory for config, state, artifacts and logs [default: ~/.datastack]
    #[arg(long, global = true, value_name = "DIR", env = "DATASTACK_WORKDIR")]
    pub workdir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy the platform, phase by phase
    Deploy(commands::deploy::DeployArgs),

    /// Tear the platform down, latest phase first
    Destroy(commands::destroy::DestroyArgs),

    /// Show per-phase, per-service progress
    Status(commands::status::StatusArgs),

    /// Decrypt a checked-out deployment record
    Decrypt(commands::decrypt::DecryptArgs),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command and return the process exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails before producing a result.
    pub async fn run(self, cancel: &AtomicBool) -> Result<i32> {
        let Cli {
            json,
            quiet,
            no_color,
            verbose: _,
            yes,
            workdir,
            command,
        } = self;
        let app = AppContext::new(GlobalFlags {
            json,
            quiet,
            no_color,
            yes,
            workdir,
        })?;

        match command {
            Command::Deploy(args) => commands::deploy::run(&app, &args, cancel).await,
            Command::Destroy(args) => commands::destroy::run(&app, &args, cancel).await,
            Command::Status(args) => commands::status::run(&app, &args).await.map(|()| 0),
            Command::Decrypt(args) => commands::decrypt::run(&app, &args).map(|()| 0),
            Command::Version => commands::version::run(&app).map(|()| 0),
        }
    }
}
