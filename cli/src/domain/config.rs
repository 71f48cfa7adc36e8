//! Platform configuration schema and validation.
//!
//! Pure functions only: no I/O, no async, no filesystem access. Credentials
//! are never stored here: the config names the environment variables that
//! hold them.

use std::collections::BTreeMap;

use anyhow::Result;
use datastack_common::CloudProvider;
use serde::{Deserialize, Serialize};

use crate::domain::error::DeployError;

// ── Constants ────────────────────────────────────────────────────────────────

pub const DEFAULT_VAULT_ADDRESS: &str = "http://127.0.0.1:8200";
pub const DEFAULT_BRANCH: &str = "main";

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level installer configuration, stored as `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Customer slug; prefixes cloud resources and secret paths.
    pub customer: String,
    pub cloud_provider: CloudProvider,
    pub region: String,
    /// Base DNS domain for platform ingress hosts.
    pub domain: String,
    pub vault: VaultConfig,
    pub repositories: RepositoryConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Chart version overrides keyed by service id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub charts: BTreeMap<String, String>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Which vault backend holds platform secrets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum VaultConfig {
    /// HashiCorp Vault deployed in the cluster, reached through a port-forward.
    InCluster {
        #[serde(default = "default_vault_address")]
        address: String,
        /// Environment variable holding the vault token.
        token_env: String,
    },
    /// External secrets SaaS authenticated with client credentials.
    External {
        api_url: String,
        client_id_env: String,
        client_secret_env: String,
        project_id: String,
        environment: String,
    },
}

impl VaultConfig {
    #[must_use]
    pub fn is_in_cluster(&self) -> bool {
        matches!(self, VaultConfig::InCluster { .. })
    }
}

/// Remote git repositories the installer reads from or pushes to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// GitOps repository receiving rendered application manifests.
    pub gitops_url: String,
    /// Operator-supplied DAG repository wired into Airflow.
    pub dags_url: String,
    /// Repository receiving the encrypted deployment record.
    pub artifacts_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

/// Kubernetes cluster sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterConfig {
    /// Defaults to `<customer>-data` when empty.
    pub name: String,
    pub node_count: u32,
    /// Defaults per cloud provider when empty.
    pub node_size: String,
    pub kubernetes_version: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            node_count: 3,
            node_size: String::new(),
            kubernetes_version: "1.30".to_string(),
        }
    }
}

/// Command timeouts in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub command_secs: u64,
    pub infrastructure_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_secs: 600,
            infrastructure_secs: 3600,
        }
    }
}

fn default_vault_address() -> String {
    DEFAULT_VAULT_ADDRESS.to_string()
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

impl PlatformConfig {
    /// Cluster name with the customer-derived default applied.
    #[must_use]
    pub fn cluster_name(&self) -> String {
        if self.cluster.name.is_empty() {
            format!("{}-data", self.customer)
        } else {
            self.cluster.name.clone()
        }
    }

    /// Node size with the provider default applied.
    #[must_use]
    pub fn node_size(&self) -> String {
        if !self.cluster.node_size.is_empty() {
            return self.cluster.node_size.clone();
        }
        match self.cloud_provider {
            CloudProvider::Aws => "m6i.xlarge",
            CloudProvider::Gcp => "e2-standard-4",
            CloudProvider::Azure => "Standard_D4s_v5",
        }
        .to_string()
    }

    /// external-dns provider name for the configured cloud.
    #[must_use]
    pub fn dns_provider(&self) -> &'static str {
        match self.cloud_provider {
            CloudProvider::Aws => "aws",
            CloudProvider::Gcp => "google",
            CloudProvider::Azure => "azure",
        }
    }

    /// Flat key/value view used as the base template context.
    ///
    /// A `BTreeMap` keeps iteration order stable so rendering is deterministic.
    #[must_use]
    pub fn template_values(&self) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();
        values.insert("customer".into(), self.customer.clone());
        values.insert("cloud_provider".into(), self.cloud_provider.to_string());
        values.insert("dns_provider".into(), self.dns_provider().to_string());
        values.insert("region".into(), self.region.clone());
        values.insert("domain".into(), self.domain.clone());
        values.insert("cluster_name".into(), self.cluster_name());
        values.insert("node_count".into(), self.cluster.node_count.to_string());
        values.insert("node_size".into(), self.node_size());
        values.insert(
            "kubernetes_version".into(),
            self.cluster.kubernetes_version.clone(),
        );
        values.insert("gitops_url".into(), self.repositories.gitops_url.clone());
        values.insert("dags_url".into(), self.repositories.dags_url.clone());
        values.insert("branch".into(), self.repositories.branch.clone());
        values
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a loaded configuration.
///
/// # Errors
///
/// Returns a `DeployError::Configuration` naming the first invalid field.
pub fn validate_config(config: &PlatformConfig) -> Result<()> {
    validate_customer(&config.customer)?;
    if config.region.trim().is_empty() {
        return Err(DeployError::config("region is empty", "set `region`, e.g. eu-west-1").into());
    }
    validate_domain(&config.domain)?;
    validate_repo_url("repositories.gitops_url", &config.repositories.gitops_url)?;
    validate_repo_url("repositories.dags_url", &config.repositories.dags_url)?;
    validate_repo_url(
        "repositories.artifacts_url",
        &config.repositories.artifacts_url,
    )?;
    if config.repositories.branch.trim().is_empty() {
        return Err(DeployError::config(
            "repositories.branch is empty",
            "remove the key to use 'main'",
        )
        .into());
    }
    if config.cluster.node_count == 0 {
        return Err(DeployError::config(
            "cluster.node_count must be at least 1",
            "the default is 3 nodes",
        )
        .into());
    }
    if config.timeouts.command_secs == 0 || config.timeouts.infrastructure_secs == 0 {
        return Err(DeployError::config(
            "timeouts must be greater than zero",
            "remove the `timeouts` section to use defaults",
        )
        .into());
    }
    validate_vault(&config.vault)
}

/// Customer slugs become cloud resource prefixes and secret path segments.
///
/// # Errors
///
/// Returns an error if the slug does not match `^[a-z][a-z0-9-]{1,30}$`.
pub fn validate_customer(customer: &str) -> Result<()> {
    let mut chars = customer.chars();
    let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !starts_alpha || !rest_ok || customer.len() < 2 || customer.len() > 31 {
        return Err(DeployError::config(
            format!("invalid customer '{customer}'"),
            "use 2-31 lowercase letters, digits or dashes, starting with a letter",
        )
        .into());
    }
    Ok(())
}

fn validate_domain(domain: &str) -> Result<()> {
    let valid = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if !valid {
        return Err(DeployError::config(
            format!("invalid domain '{domain}'"),
            "use a DNS name you control, e.g. data.example.com",
        )
        .into());
    }
    Ok(())
}

fn validate_repo_url(key: &str, url: &str) -> Result<()> {
    let valid = url.starts_with("https://") || url.starts_with("ssh://") || url.starts_with("git@");
    if !valid {
        return Err(DeployError::config(
            format!("{key} '{url}' is not a git remote URL"),
            "use an https://, ssh:// or git@host:owner/repo.git URL",
        )
        .into());
    }
    Ok(())
}

fn validate_env_name(key: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(DeployError::config(
            format!("{key} '{name}' is not an environment variable name"),
            "name the variable holding the credential, e.g. VAULT_TOKEN",
        )
        .into());
    }
    Ok(())
}

fn validate_vault(vault: &VaultConfig) -> Result<()> {
    match vault {
        VaultConfig::InCluster {
            address, token_env, ..
        } => {
            if !address.starts_with("http://") && !address.starts_with("https://") {
                return Err(DeployError::config(
                    format!("vault.address '{address}' is not an http(s) URL"),
                    format!("the default is {DEFAULT_VAULT_ADDRESS}"),
                )
                .into());
            }
            validate_env_name("vault.token_env", token_env)
        }
        VaultConfig::External {
            api_url,
            client_id_env,
            client_secret_env,
            project_id,
            environment,
        } => {
            if !api_url.starts_with("https://") {
                return Err(DeployError::config(
                    format!("vault.api_url '{api_url}' must use https"),
                    "client credentials are never sent over plain http",
                )
                .into());
            }
            validate_env_name("vault.client_id_env", client_id_env)?;
            validate_env_name("vault.client_secret_env", client_secret_env)?;
            if project_id.is_empty() || environment.is_empty() {
                return Err(DeployError::config(
                    "vault.project_id and vault.environment are required",
                    "copy both from the secrets provider's project settings",
                )
                .into());
            }
            Ok(())
        }
    }
}

// ── Unit tests ───────────────────────────────────────────────────────────────
