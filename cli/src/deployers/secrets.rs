//! Platform secrets: minted once into the vault backend, then mirrored into
//! one Kubernetes Secret per consuming service.
//!
//! Secret values never touch the artifact tree. Manifests carrying them are
//! built in memory and piped to `kubectl apply -f -` on stdin.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use datastack_common::secret_paths::layout::ROOT;
use serde_json::json;

use crate::application::deployer::DeployContext;
use crate::application::ports::{CommandExecutor, VaultBackend};
use crate::domain::secrets::SecretShape;
use crate::domain::{DeployError, SecretSpec, ServiceResult};

use super::{kubectl, registry, tunnel};

/// Credentials minted for the platform, grouped by consuming service.
pub const PLATFORM_SECRETS: &[SecretSpec] = &[
    SecretSpec::password("argocd", "admin-password", 24),
    SecretSpec::password("monitoring", "grafana-admin-password", 24),
    SecretSpec::password("postgres", "admin-password", 32),
    SecretSpec::password("airbyte", "db-password", 32),
    SecretSpec::password("airflow", "db-password", 32),
    SecretSpec::token("airflow", "webserver-secret-key", 32),
    SecretSpec::keypair("airflow", "dags-deploy-key"),
    SecretSpec::password("datahub", "db-password", 32),
    SecretSpec::password("superset", "db-password", 32),
    SecretSpec::token("superset", "secret-key", 42),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretsUnit {
    pub specs: &'static [SecretSpec],
}

/// Name of the Kubernetes Secret holding a service's credentials.
#[must_use]
pub fn k8s_secret_name(service: &str) -> String {
    format!("{service}-credentials")
}

/// Specs grouped by consuming service, in a stable order.
fn by_service(specs: &[SecretSpec]) -> BTreeMap<&'static str, Vec<&SecretSpec>> {
    let mut groups: BTreeMap<&'static str, Vec<&SecretSpec>> = BTreeMap::new();
    for spec in specs {
        groups.entry(spec.service).or_default().push(spec);
    }
    groups
}

fn namespace_for(service: &str) -> Result<&'static str> {
    registry::namespace_of(service).ok_or_else(|| {
        DeployError::config(
            format!("secret consumer '{service}' has no namespace in the registry"),
            "secrets can only target services deployed into the cluster",
        )
        .into()
    })
}

fn shape_name(shape: SecretShape) -> &'static str {
    match shape {
        SecretShape::Password { .. } => "password",
        SecretShape::Token { .. } => "token",
        SecretShape::Ed25519Keypair => "ed25519-keypair",
    }
}

/// Write `secrets-index.yaml`: where every secret lives, never its value.
pub(super) fn render_index<E: CommandExecutor, V: VaultBackend>(
    unit: &SecretsUnit,
    ctx: &DeployContext<'_, E, V>,
    out_dir: &Path,
) -> Result<PathBuf> {
    let customer = &ctx.config.customer;
    let mut index = serde_json::Map::new();
    for (service, specs) in by_service(unit.specs) {
        let namespace = namespace_for(service)?;
        let keys: Vec<serde_json::Value> = specs
            .iter()
            .map(|spec| {
                json!({
                    "key": spec.name,
                    "shape": shape_name(spec.shape),
                    "paths": spec.paths(customer),
                })
            })
            .collect();
        index.insert(
            service.to_string(),
            json!({
                "namespace": namespace,
                "secret": k8s_secret_name(service),
                "keys": keys,
            }),
        );
    }
    let yaml = serde_yaml::to_string(&serde_json::Value::Object(index))
        .context("serializing secrets index")?;
    ctx.renderer.write(&out_dir.join("secrets-index.yaml"), &yaml)
}

/// Kubernetes `List` with the namespace and the Secret, as JSON.
fn secret_manifest(namespace: &str, name: &str, data: &BTreeMap<String, String>) -> Vec<u8> {
    json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": [
            {
                "apiVersion": "v1",
                "kind": "Namespace",
                "metadata": { "name": namespace },
            },
            {
                "apiVersion": "v1",
                "kind": "Secret",
                "type": "Opaque",
                "metadata": {
                    "name": name,
                    "namespace": namespace,
                    "labels": { "app.kubernetes.io/managed-by": "datastack" },
                },
                "stringData": data,
            },
        ],
    })
    .to_string()
    .into_bytes()
}

pub(super) async fn apply<E: CommandExecutor, V: VaultBackend>(
    unit: &SecretsUnit,
    ctx: &DeployContext<'_, E, V>,
) -> Result<ServiceResult> {
    let mut result = ServiceResult::default();
    let customer = &ctx.config.customer;
    let _tunnel = tunnel::open(ctx).await?;

    let ensured = ctx.secrets.ensure(unit.specs).await?;
    result.ok(format!("{} secrets in {}", ensured.len(), ctx.secrets.backend().name()));

    for (service, specs) in by_service(unit.specs) {
        let namespace = namespace_for(service)?;
        let name = k8s_secret_name(service);
        let mut data = BTreeMap::new();
        for spec in specs {
            for path in spec.paths(customer) {
                let value = ctx.secrets.fetch(&path).await?;
                let key = path.rsplit('/').next().unwrap_or(spec.name).to_string();
                data.insert(key, value.expose().to_string());
            }
        }
        let cmd = kubectl(ctx)
            .args(["apply", "-f", "-"])
            .stdin(secret_manifest(namespace, &name, &data));
        ctx.executor.execute(&cmd).await?;
        result.ok(format!("secret {namespace}/{name}"));
    }
    Ok(result)
}

/// Removes the Kubernetes copies. Values in the vault backend are kept so a
/// redeploy reuses them.
pub(super) async fn destroy<E: CommandExecutor, V: VaultBackend>(
    unit: &SecretsUnit,
    ctx: &DeployContext<'_, E, V>,
) -> Result<ServiceResult> {
    let mut result = ServiceResult::default();
    for service in by_service(unit.specs).keys() {
        let namespace = namespace_for(service)?;
        let name = k8s_secret_name(service);
        ctx.executor
            .execute(&kubectl(ctx).args([
                "delete",
                "secret",
                name.as_str(),
                "--namespace",
                namespace,
                "--ignore-not-found",
            ]))
            .await?;
        result.ok(format!("deleted secret {namespace}/{name}"));
    }
    tracing::info!(
        backend = ctx.secrets.backend().name(),
        "vault values under {}/{} are kept",
        ROOT,
        ctx.config.customer
    );
    Ok(result)
}
