//! Loads and saves `PlatformConfig` as YAML.

use std::path::Path;

use anyhow::{Context, Result};

use crate::domain::config::{PlatformConfig, validate_config};
use crate::domain::DeployError;

/// Read and validate a configuration file.
///
/// # Errors
///
/// Returns `DeployError::Configuration` if the file is missing, unparsable
/// or invalid.
pub fn load_config(path: &Path) -> Result<PlatformConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DeployError::config(
                format!("no configuration at {}", path.display()),
                "pass --config FILE, or run `datastack deploy --interactive` to create one",
            )
            .into());
        }
        Err(e) => return Err(e).with_context(|| format!("cannot read {}", path.display())),
    };
    let config: PlatformConfig = serde_yaml::from_str(&content).map_err(|e| {
        DeployError::config(
            format!("cannot parse {}: {e}", path.display()),
            "compare the file with the documented config.yaml layout",
        )
    })?;
    validate_config(&config)?;
    tracing::debug!(path = %path.display(), customer = %config.customer, "configuration loaded");
    Ok(config)
}

/// Write a configuration file, owner-readable only.
///
/// # Errors
///
/// Returns an error if the file cannot be serialized or written.
pub fn save_config(path: &Path, config: &PlatformConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let content = serde_yaml::to_string(config).context("cannot serialize config")?;
    std::fs::write(path, content).with_context(|| format!("cannot write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("cannot set permissions on {}", path.display()))?;
    }
    Ok(())
}
