//! Vault backends: implementations of the `VaultBackend` port.
//!
//! Both talk HTTP through a blocking `ureq` agent moved onto the blocking
//! pool. Credentials come from environment variables named in the config and
//! are read at construction; a dry run never calls either backend, so missing
//! credentials only fail a real run.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::application::ports::VaultBackend;
use crate::domain::{DeployError, SecretValue, VaultConfig};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// KV v2 mount used for platform secrets.
const KV_MOUNT: &str = "secret";

fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("datastack/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Translate a `ureq` failure into the deployment error taxonomy.
fn map_http_error(backend: &str, err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(code @ (401 | 403), _) => DeployError::config(
            format!("{backend} rejected the credentials (HTTP {code})"),
            "check the token or client credentials named in the vault config",
        )
        .into(),
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            DeployError::BackendUnavailable {
                backend: backend.to_string(),
                reason: format!("HTTP {code}: {}", body.trim()),
            }
            .into()
        }
        ureq::Error::Transport(t) => DeployError::BackendUnavailable {
            backend: backend.to_string(),
            reason: t.to_string(),
        }
        .into(),
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn missing_credential(name: &str) -> anyhow::Error {
    DeployError::config(
        format!("environment variable {name} is not set"),
        format!("export {name} before a real (non dry-run) deployment"),
    )
    .into()
}

async fn blocking<T, F>(what: &'static str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .with_context(|| format!("{what} task panicked"))?
}

// ── In-cluster HashiCorp Vault ────────────────────────────────────────────────

/// HashiCorp Vault KV v2, reached over a `kubectl port-forward` tunnel.
#[derive(Clone)]
pub struct LocalVault {
    address: String,
    token: Option<String>,
    token_env: String,
    agent: ureq::Agent,
}

impl LocalVault {
    #[must_use]
    pub fn new(address: impl Into<String>, token_env: impl Into<String>) -> Self {
        let token_env = token_env.into();
        Self {
            address: address.into().trim_end_matches('/').to_string(),
            token: read_env(&token_env),
            token_env,
            agent: agent(),
        }
    }

    fn token(&self) -> Result<String> {
        self.token
            .clone()
            .ok_or_else(|| missing_credential(&self.token_env))
    }
}

/// `{address}/v1/{mount}/data/{path}`
#[must_use]
pub fn kv_data_url(address: &str, path: &str) -> String {
    format!("{address}/v1/{KV_MOUNT}/data/{}", path.trim_start_matches('/'))
}

/// Extract `data.data.value` from a KV v2 read response.
///
/// # Errors
///
/// Returns an error if the response does not carry a string `value`.
pub fn parse_kv_value(body: &Value) -> Result<SecretValue> {
    body.pointer("/data/data/value")
        .and_then(Value::as_str)
        .map(SecretValue::new)
        .context("vault response has no data.data.value string")
}

impl VaultBackend for LocalVault {
    fn name(&self) -> &str {
        "in-cluster vault"
    }

    async fn put(&self, path: &str, value: &SecretValue) -> Result<()> {
        let token = self.token()?;
        let url = kv_data_url(&self.address, path);
        let body = json!({ "data": { "value": value.expose() } }).to_string();
        let agent = self.agent.clone();
        blocking("vault write", move || {
            agent
                .post(&url)
                .set("X-Vault-Token", &token)
                .set("Content-Type", "application/json")
                .send_string(&body)
                .map_err(|e| map_http_error("in-cluster vault", e))?;
            Ok(())
        })
        .await
    }

    async fn get(&self, path: &str) -> Result<Option<SecretValue>> {
        let token = self.token()?;
        let url = kv_data_url(&self.address, path);
        let agent = self.agent.clone();
        blocking("vault read", move || {
            match agent.get(&url).set("X-Vault-Token", &token).call() {
                Ok(resp) => {
                    let body: Value = serde_json::from_str(
                        &resp.into_string().context("reading vault response")?,
                    )
                    .context("parsing vault response")?;
                    parse_kv_value(&body).map(Some)
                }
                Err(ureq::Error::Status(404, _)) => Ok(None),
                Err(e) => Err(map_http_error("in-cluster vault", e)),
            }
        })
        .await
    }
}

// ── External secrets service ──────────────────────────────────────────────────

/// Hosted secrets service authenticated with client credentials.
///
/// Secret paths map to folder + key: `datastack/acme/airflow/db-password` is
/// key `db-password` in folder `/datastack/acme/airflow`.
#[derive(Clone)]
pub struct ExternalVault {
    api_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    client_id_env: String,
    client_secret_env: String,
    project_id: String,
    environment: String,
    agent: ureq::Agent,
    access_token: Arc<Mutex<Option<String>>>,
}

impl ExternalVault {
    #[must_use]
    pub fn new(
        api_url: impl Into<String>,
        client_id_env: impl Into<String>,
        client_secret_env: impl Into<String>,
        project_id: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        let client_id_env = client_id_env.into();
        let client_secret_env = client_secret_env.into();
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client_id: read_env(&client_id_env),
            client_secret: read_env(&client_secret_env),
            client_id_env,
            client_secret_env,
            project_id: project_id.into(),
            environment: environment.into(),
            agent: agent(),
            access_token: Arc::new(Mutex::new(None)),
        }
    }

    /// Log in once per process and reuse the bearer token.
    async fn bearer(&self) -> Result<String> {
        if let Some(token) = self
            .access_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Ok(token);
        }
        let client_id = self
            .client_id
            .clone()
            .ok_or_else(|| missing_credential(&self.client_id_env))?;
        let client_secret = self
            .client_secret
            .clone()
            .ok_or_else(|| missing_credential(&self.client_secret_env))?;
        let url = format!("{}/api/v1/auth/universal-auth/login", self.api_url);
        let body = json!({ "clientId": client_id, "clientSecret": client_secret }).to_string();
        let agent = self.agent.clone();
        let token = blocking("secrets login", move || {
            let resp = agent
                .post(&url)
                .set("Content-Type", "application/json")
                .send_string(&body)
                .map_err(|e| map_http_error("external secrets service", e))?;
            let body: Value = serde_json::from_str(&resp.into_string().context("reading login response")?)
                .context("parsing login response")?;
            body.get("accessToken")
                .and_then(Value::as_str)
                .map(str::to_string)
                .context("login response has no accessToken")
        })
        .await?;
        tracing::debug!("authenticated with external secrets service");
        *self
            .access_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(token)
    }

    fn secret_url(&self, key: &str) -> String {
        format!("{}/api/v3/secrets/raw/{key}", self.api_url)
    }
}

/// Split `a/b/c/key` into (`/a/b/c`, `key`).
#[must_use]
pub fn split_secret_path(path: &str) -> (String, String) {
    let trimmed = path.trim_matches('/');
    match trimmed.rsplit_once('/') {
        Some((folder, key)) => (format!("/{folder}"), key.to_string()),
        None => ("/".to_string(), trimmed.to_string()),
    }
}

impl VaultBackend for ExternalVault {
    fn name(&self) -> &str {
        "external secrets service"
    }

    async fn put(&self, path: &str, value: &SecretValue) -> Result<()> {
        let token = self.bearer().await?;
        let (folder, key) = split_secret_path(path);
        let url = self.secret_url(&key);
        let body = json!({
            "workspaceId": self.project_id,
            "environment": self.environment,
            "secretPath": folder,
            "secretValue": value.expose(),
            "type": "shared",
        })
        .to_string();
        let agent = self.agent.clone();
        blocking("secrets write", move || {
            let auth = format!("Bearer {token}");
            // Update in place; create when the key does not exist yet.
            let updated = agent
                .request("PATCH", &url)
                .set("Authorization", &auth)
                .set("Content-Type", "application/json")
                .send_string(&body);
            match updated {
                Ok(_) => Ok(()),
                Err(ureq::Error::Status(400 | 404, _)) => {
                    agent
                        .post(&url)
                        .set("Authorization", &auth)
                        .set("Content-Type", "application/json")
                        .send_string(&body)
                        .map_err(|e| map_http_error("external secrets service", e))?;
                    Ok(())
                }
                Err(e) => Err(map_http_error("external secrets service", e)),
            }
        })
        .await
    }

    async fn get(&self, path: &str) -> Result<Option<SecretValue>> {
        let token = self.bearer().await?;
        let (folder, key) = split_secret_path(path);
        let url = self.secret_url(&key);
        let project = self.project_id.clone();
        let environment = self.environment.clone();
        let agent = self.agent.clone();
        blocking("secrets read", move || {
            let resp = agent
                .get(&url)
                .query("workspaceId", &project)
                .query("environment", &environment)
                .query("secretPath", &folder)
                .set("Authorization", &format!("Bearer {token}"))
                .call();
            match resp {
                Ok(resp) => {
                    let body: Value = serde_json::from_str(
                        &resp.into_string().context("reading secrets response")?,
                    )
                    .context("parsing secrets response")?;
                    body.pointer("/secret/secretValue")
                        .and_then(Value::as_str)
                        .map(|v| Some(SecretValue::new(v)))
                        .context("secrets response has no secret.secretValue")
                }
                Err(ureq::Error::Status(404, _)) => Ok(None),
                Err(e) => Err(map_http_error("external secrets service", e)),
            }
        })
        .await
    }
}

// ── Selection ─────────────────────────────────────────────────────────────────

/// The backend chosen by configuration.
#[derive(Clone)]
pub enum ConfiguredVault {
    Local(LocalVault),
    External(ExternalVault),
}

impl ConfiguredVault {
    #[must_use]
    pub fn from_config(config: &VaultConfig) -> Self {
        match config {
            VaultConfig::InCluster {
                address, token_env, ..
            } => Self::Local(LocalVault::new(address, token_env)),
            VaultConfig::External {
                api_url,
                client_id_env,
                client_secret_env,
                project_id,
                environment,
            } => Self::External(ExternalVault::new(
                api_url,
                client_id_env,
                client_secret_env,
                project_id,
                environment,
            )),
        }
    }
}

impl VaultBackend for ConfiguredVault {
    fn name(&self) -> &str {
        match self {
            Self::Local(v) => v.name(),
            Self::External(v) => v.name(),
        }
    }

    async fn put(&self, path: &str, value: &SecretValue) -> Result<()> {
        match self {
            Self::Local(v) => v.put(path, value).await,
            Self::External(v) => v.put(path, value).await,
        }
    }

    async fn get(&self, path: &str) -> Result<Option<SecretValue>> {
        match self {
            Self::Local(v) => v.get(path).await,
            Self::External(v) => v.get(path).await,
        }
    }
}
