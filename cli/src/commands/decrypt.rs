//! `datastack decrypt`: restore a checked-out deployment record.
//!
//! Operator-driven and offline: reads the key from an environment variable
//! or a hidden prompt, never from the vault backend.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::app::AppContext;
use crate::domain::{DeployError, EncryptionKey};
use crate::infra::encryption::EncryptionService;
use crate::output::HumanRenderer;

/// Arguments for the decrypt command.
#[derive(Args, Debug)]
pub struct DecryptArgs {
    /// Directory holding `.enc` files (decrypted in place)
    pub dir: PathBuf,

    /// Environment variable holding the base64 key
    #[arg(long, value_name = "VAR", default_value = "DATASTACK_ARTIFACT_KEY")]
    pub key_env: String,
}

/// Run `datastack decrypt`.
///
/// # Errors
///
/// Returns an error if the key is missing or malformed, or if any file fails
/// authentication.
pub fn run(app: &AppContext, args: &DecryptArgs) -> Result<()> {
    if !args.dir.is_dir() {
        return Err(DeployError::config(
            format!("{} is not a directory", args.dir.display()),
            "point decrypt at the checked-out artifacts directory",
        )
        .into());
    }
    let key = EncryptionKey::from_base64(read_key(app, &args.key_env)?.trim())?;
    tracing::info!(fingerprint = %key.fingerprint(), dir = %args.dir.display(), "decrypting");

    let restored = EncryptionService.decrypt_tree(&args.dir, &key)?;
    if app.is_json() {
        crate::output::json::print(&serde_json::json!({
            "key_fingerprint": key.fingerprint(),
            "restored": restored,
        }))
    } else {
        HumanRenderer::new(&app.output).render_decrypted(restored.len(), &args.dir);
        Ok(())
    }
}

fn read_key(app: &AppContext, env: &str) -> Result<String> {
    if let Ok(value) = std::env::var(env)
        && !value.trim().is_empty()
    {
        return Ok(value);
    }
    if app.non_interactive {
        return Err(DeployError::config(
            format!("{env} is not set"),
            format!("export {env}=<base64 key shown when the record was created>"),
        )
        .into());
    }
    dialoguer::Password::new()
        .with_prompt("Artifact encryption key (base64)")
        .interact()
        .context("key prompt")
}
