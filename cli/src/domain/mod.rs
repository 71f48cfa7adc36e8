//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod command;
pub mod config;
pub mod crypto;
pub mod error;
pub mod layout;
pub mod outcome;
pub mod secrets;
pub mod template;

pub use command::{CommandSpec, DryRunBehavior, ExecRecord, ExecResult, FakeValue, RunJournal};
pub use config::{PlatformConfig, VaultConfig, validate_config};
pub use crypto::{EncryptedArtifact, EncryptedTree, EncryptionKey, SkippedFile};
pub use error::{DeployError, classify};
pub use layout::ArtifactLayout;
pub use outcome::{
    DeploymentResult, FailureReport, PhaseStatusView, RunKind, ServiceRef, ServiceResult,
    ServiceStatusView, StatusView,
};
pub use secrets::{Secret, SecretBundle, SecretSource, SecretSpec, SecretValue};
