//! Secrets manager: generates credentials and moves them to and from the
//! vault backend.
//!
//! In dry-run mode nothing reaches the backend: generated secrets stay in
//! memory and are mirrored to a local inspection file, and fetches return
//! marked placeholders.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::application::ports::VaultBackend;
use crate::domain::secrets::generate;
use crate::domain::{DeployError, Secret, SecretBundle, SecretSource, SecretSpec, SecretValue};

/// Owns every secret value touched during a run.
pub struct SecretsManager<V: VaultBackend> {
    backend: V,
    customer: String,
    dry_run: bool,
    inspection_file: PathBuf,
    bundle: Mutex<SecretBundle>,
    rng: Mutex<StdRng>,
}

impl<V: VaultBackend> SecretsManager<V> {
    pub fn new(
        backend: V,
        customer: impl Into<String>,
        dry_run: bool,
        inspection_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            customer: customer.into(),
            dry_run,
            inspection_file: inspection_file.into(),
            bundle: Mutex::new(SecretBundle::default()),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the random source (seeded generation in tests).
    #[must_use]
    pub fn with_rng(self, rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            ..self
        }
    }

    pub fn backend(&self) -> &V {
        &self.backend
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Snapshot of the secrets held in memory.
    #[must_use]
    pub fn bundle(&self) -> SecretBundle {
        self.bundle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Generate fresh values for `specs`. Nothing is stored.
    #[must_use]
    pub fn generate(&self, specs: &[SecretSpec]) -> SecretBundle {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let mut bundle = SecretBundle::default();
        for spec in specs {
            for secret in generate(&self.customer, spec, &mut *rng) {
                bundle.insert(secret);
            }
        }
        bundle
    }

    /// Persist `bundle`: to the backend in real mode, to the local inspection
    /// file in dry-run mode. Either way the values are kept in memory.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::BackendUnavailable` if the backend cannot be
    /// reached, or an I/O error if the inspection file cannot be written.
    pub async fn store(&self, bundle: &SecretBundle) -> Result<()> {
        if self.dry_run {
            let snapshot = {
                let mut held = self.bundle.lock().unwrap_or_else(PoisonError::into_inner);
                held.extend(bundle.clone());
                held.clone()
            };
            self.write_inspection(&snapshot).await?;
            tracing::info!(
                count = bundle.len(),
                file = %self.inspection_file.display(),
                "[DRY-RUN] secrets kept local, not written to {}",
                self.backend.name()
            );
            return Ok(());
        }

        for secret in bundle.secrets.values() {
            self.backend
                .put(&secret.path, &secret.value)
                .await
                .with_context(|| format!("storing {} in {}", secret.path, self.backend.name()))?;
            tracing::debug!(path = %secret.path, "secret stored");
        }
        self.bundle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(bundle.clone());
        Ok(())
    }

    /// Store a single value under `path`.
    ///
    /// # Errors
    ///
    /// See [`SecretsManager::store`].
    pub async fn store_value(&self, path: &str, value: SecretValue) -> Result<()> {
        let mut bundle = SecretBundle::default();
        bundle.insert(Secret {
            path: path.to_string(),
            value,
            source: SecretSource::Generated,
        });
        self.store(&bundle).await
    }

    /// Read the secret at `path`: the in-memory copy first, then the backend.
    /// A dry run returns a placeholder instead of a live read.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Configuration` if the secret does not exist and
    /// `DeployError::BackendUnavailable` if the backend cannot be reached.
    pub async fn fetch(&self, path: &str) -> Result<SecretValue> {
        if self.dry_run {
            tracing::debug!(path, "[DRY-RUN] returning placeholder secret");
            return Ok(SecretValue::placeholder(path));
        }
        if let Some(secret) = self
            .bundle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
        {
            return Ok(secret.value.clone());
        }
        let value = self
            .backend
            .get(path)
            .await
            .with_context(|| format!("reading {path} from {}", self.backend.name()))?
            .ok_or_else(|| {
                DeployError::config(
                    format!("secret {path} not found in {}", self.backend.name()),
                    "re-run the secrets phase (--phase 2) to generate it",
                )
            })?;
        self.bundle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Secret {
                path: path.to_string(),
                value: value.clone(),
                source: SecretSource::Vault,
            });
        Ok(value)
    }

    /// Make sure every secret in `specs` exists, generating and storing only
    /// the missing ones. Existing values are never rotated.
    ///
    /// Returns the full set of secrets for `specs`.
    ///
    /// # Errors
    ///
    /// See [`SecretsManager::store`].
    pub async fn ensure(&self, specs: &[SecretSpec]) -> Result<SecretBundle> {
        let mut result = SecretBundle::default();
        let mut missing = Vec::new();

        for spec in specs {
            if self.dry_run {
                missing.push(spec.clone());
                continue;
            }
            let mut existing = Vec::new();
            for path in spec.paths(&self.customer) {
                let found = self
                    .backend
                    .get(&path)
                    .await
                    .with_context(|| format!("checking {path} in {}", self.backend.name()))?;
                if let Some(value) = found {
                    existing.push(Secret {
                        path,
                        value,
                        source: SecretSource::Vault,
                    });
                }
            }
            // A keypair with only one half present is regenerated whole.
            if existing.len() == spec.paths(&self.customer).len() {
                for secret in existing {
                    result.insert(secret);
                }
            } else {
                missing.push(spec.clone());
            }
        }

        let reused = result.len();
        if reused > 0 {
            self.bundle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(result.clone());
        }
        let fresh = self.generate(&missing);
        self.store(&fresh).await?;
        tracing::info!(reused, generated = fresh.len(), "secrets ensured");
        result.extend(fresh);
        Ok(result)
    }

    async fn write_inspection(&self, bundle: &SecretBundle) -> Result<()> {
        let path = self.inspection_file.clone();
        let json = serde_json::to_string_pretty(&bundle.inspection_json())
            .context("serializing secrets inspection file")?;
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))
        })
        .await
        .context("spawn_blocking for secrets inspection file")?
    }
}
