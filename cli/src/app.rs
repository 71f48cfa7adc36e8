//! Application context: unified state passed to every command handler.
//!
//! Built once in `Cli::run()` from the global flags. Commands receive
//! `&AppContext` and never read global flags or environment on their own.

use std::path::PathBuf;

use anyhow::Result;

use crate::domain::{ArtifactLayout, DeployError};
use crate::output::{HumanRenderer, OutputContext, Renderer};

/// Global flags, after clap has applied `NO_COLOR`, `DATASTACK_YES` and
/// `DATASTACK_WORKDIR`.
#[derive(Debug, Default)]
pub struct GlobalFlags {
    pub json: bool,
    pub quiet: bool,
    pub no_color: bool,
    pub yes: bool,
    pub workdir: Option<PathBuf>,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Where config, state, artifacts and logs live.
    pub layout: ArtifactLayout,
    /// Skip prompts: `--yes`, `DATASTACK_YES`, or a `CI` environment.
    pub non_interactive: bool,
    json: bool,
}

impl AppContext {
    /// # Errors
    ///
    /// Returns an error if no workdir was given and the home directory
    /// cannot be determined.
    pub fn new(flags: GlobalFlags) -> Result<Self> {
        let workdir = match flags.workdir {
            Some(dir) => dir,
            None => default_workdir()?,
        };
        Ok(Self {
            output: OutputContext::new(flags.no_color, flags.quiet, flags.json),
            layout: ArtifactLayout::new(workdir),
            non_interactive: flags.yes || std::env::var_os("CI").is_some(),
            json: flags.json,
        })
    }

    #[must_use]
    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Human or JSON renderer, per `--json`.
    #[must_use]
    pub fn renderer(&self) -> Renderer<'_> {
        if self.json {
            Renderer::Json
        } else {
            Renderer::Human(HumanRenderer::new(&self.output))
        }
    }

    /// Ask a yes/no question, defaulting to no. Always yes when
    /// non-interactive.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.non_interactive {
            return Ok(true);
        }
        Ok(dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?)
    }
}

fn default_workdir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| {
        DeployError::config(
            "cannot determine home directory",
            "pass --workdir or set DATASTACK_WORKDIR",
        )
    })?;
    Ok(home.join(".datastack"))
}
