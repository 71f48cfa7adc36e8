//! Application layer: port trait definitions and use-case orchestration.
//!
//! This module depends only on `crate::domain`, never on `crate::infra`,
//! `crate::commands`, or `crate::output`.

pub mod deployer;
pub mod executor;
pub mod ports;
pub mod renderer;
pub mod services;

pub use deployer::{DeployContext, Deployer};
pub use executor::Executor;
pub use ports::{
    CommandExecutor, CommandRunner, LocalArtifactWriter, ProgressReporter, StateStore,
    VaultBackend,
};
pub use renderer::TemplateRenderer;
