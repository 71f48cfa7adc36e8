//! Port-forward to the in-cluster vault for the lifetime of one apply.

use std::time::Duration;

use anyhow::Result;
use tokio::process::Child;

use crate::application::deployer::DeployContext;
use crate::application::ports::{CommandExecutor, VaultBackend};
use crate::domain::{DeployError, VaultConfig};

use super::kubectl;

const VAULT_NAMESPACE: &str = "vault";
const VAULT_SERVICE_PORT: u16 = 8200;
const READY_ATTEMPTS: u32 = 20;
const READY_INTERVAL: Duration = Duration::from_millis(500);

/// Keeps the port-forward alive; the child is killed when this drops.
#[derive(Debug)]
pub struct VaultTunnel {
    child: Option<Child>,
}

impl VaultTunnel {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.child.is_some()
    }
}

/// Local port from an address like `http://127.0.0.1:8200`.
#[must_use]
pub fn local_port(address: &str) -> u16 {
    address
        .trim_end_matches('/')
        .rsplit(':')
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(VAULT_SERVICE_PORT)
}

/// Open a tunnel when the configured backend lives in the cluster.
///
/// # Errors
///
/// Returns `DeployError::BackendUnavailable` if the forwarded port never
/// accepts connections.
pub async fn open<E: CommandExecutor, V: VaultBackend>(
    ctx: &DeployContext<'_, E, V>,
) -> Result<VaultTunnel> {
    let VaultConfig::InCluster { address, .. } = &ctx.config.vault else {
        return Ok(VaultTunnel { child: None });
    };
    let port = local_port(address);
    let cmd = kubectl(ctx)
        .args([
            "port-forward",
            "--namespace",
            VAULT_NAMESPACE,
            "svc/vault",
        ])
        .arg(format!("{port}:{VAULT_SERVICE_PORT}"))
        .skip_in_dry_run("no cluster to forward to");
    let child = ctx.executor.spawn_background(&cmd)?;
    if child.is_some() {
        wait_until_listening(port).await?;
        tracing::debug!(port, "vault tunnel ready");
    }
    Ok(VaultTunnel { child })
}

async fn wait_until_listening(port: u16) -> Result<()> {
    for _ in 0..READY_ATTEMPTS {
        if tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(READY_INTERVAL).await;
    }
    Err(DeployError::BackendUnavailable {
        backend: "vault tunnel".to_string(),
        reason: format!("port-forward to 127.0.0.1:{port} never became ready"),
    }
    .into())
}
