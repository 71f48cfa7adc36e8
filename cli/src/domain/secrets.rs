//! Secret shapes and generation.
//!
//! Generation takes the random source as a parameter so callers decide
//! between the OS generator and a seeded one in tests.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use datastack_common::secret_path;
use ed25519_dalek::SigningKey;
use rand::{CryptoRng, Rng, RngCore};
use serde::Serialize;

/// Prefix of every placeholder returned by a dry-run fetch.
pub const PLACEHOLDER_PREFIX: &str = "DRY-RUN-PLACEHOLDER:";

/// Character set for generated passwords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Alphanumeric,
    /// Lowercase hex, for systems that reject mixed case.
    Hex,
    /// Alphanumerics plus a conservative symbol set safe in URLs and YAML.
    Symbols,
}

impl Charset {
    fn alphabet(self) -> &'static [u8] {
        match self {
            Charset::Alphanumeric => {
                b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789"
            }
            Charset::Hex => b"0123456789abcdef",
            Charset::Symbols => {
                b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_.~"
            }
        }
    }
}

/// What a required secret looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretShape {
    Password { length: usize, charset: Charset },
    /// Random bytes, URL-safe base64 without padding.
    Token { bytes: usize },
    /// Ed25519 keypair: `<name>` holds the base64 seed, `<name>-pub` the
    /// OpenSSH public key line.
    Ed25519Keypair,
}

/// A secret a deployer requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSpec {
    pub service: &'static str,
    pub name: &'static str,
    pub shape: SecretShape,
}

impl SecretSpec {
    #[must_use]
    pub const fn password(service: &'static str, name: &'static str, length: usize) -> Self {
        Self {
            service,
            name,
            shape: SecretShape::Password {
                length,
                charset: Charset::Alphanumeric,
            },
        }
    }

    #[must_use]
    pub const fn token(service: &'static str, name: &'static str, bytes: usize) -> Self {
        Self {
            service,
            name,
            shape: SecretShape::Token { bytes },
        }
    }

    #[must_use]
    pub const fn keypair(service: &'static str, name: &'static str) -> Self {
        Self {
            service,
            name,
            shape: SecretShape::Ed25519Keypair,
        }
    }

    /// Every vault path this spec produces.
    #[must_use]
    pub fn paths(&self, customer: &str) -> Vec<String> {
        let path = secret_path(customer, self.service, self.name);
        match self.shape {
            SecretShape::Ed25519Keypair => {
                let public = format!("{path}-pub");
                vec![path, public]
            }
            _ => vec![path],
        }
    }
}

/// Where a secret value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretSource {
    Generated,
    Vault,
    Fake,
}

/// A secret value whose `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// True for values fabricated by a dry run.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }

    /// Placeholder handed out instead of a live read in dry-run mode.
    #[must_use]
    pub fn placeholder(path: &str) -> Self {
        Self(format!("{PLACEHOLDER_PREFIX}{path}"))
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

/// One secret held by the secrets manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub path: String,
    pub value: SecretValue,
    pub source: SecretSource,
}

/// Secrets keyed by vault path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretBundle {
    pub secrets: BTreeMap<String, Secret>,
}

impl SecretBundle {
    pub fn insert(&mut self, secret: Secret) {
        self.secrets.insert(secret.path.clone(), secret);
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Secret> {
        self.secrets.get(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    pub fn extend(&mut self, other: SecretBundle) {
        self.secrets.extend(other.secrets);
    }

    /// JSON written to the dry-run inspection file. Values are included:
    /// nothing in a dry-run bundle ever reaches a backend.
    #[must_use]
    pub fn inspection_json(&self) -> serde_json::Value {
        let entries: serde_json::Map<String, serde_json::Value> = self
            .secrets
            .values()
            .map(|s| {
                (
                    s.path.clone(),
                    serde_json::json!({
                        "source": s.source,
                        "value": s.value.expose(),
                    }),
                )
            })
            .collect();
        serde_json::Value::Object(entries)
    }
}

/// Generate the secrets described by `spec`.
pub fn generate<R: RngCore + CryptoRng>(customer: &str, spec: &SecretSpec, rng: &mut R) -> Vec<Secret> {
    let path = secret_path(customer, spec.service, spec.name);
    let generated = |path: String, value: String| Secret {
        path,
        value: SecretValue::new(value),
        source: SecretSource::Generated,
    };
    match spec.shape {
        SecretShape::Password { length, charset } => {
            vec![generated(path, random_string(rng, length, charset))]
        }
        SecretShape::Token { bytes } => {
            let mut buf = vec![0u8; bytes];
            rng.fill_bytes(&mut buf);
            vec![generated(path, URL_SAFE_NO_PAD.encode(&buf))]
        }
        SecretShape::Ed25519Keypair => {
            let key = SigningKey::generate(rng);
            let private = STANDARD.encode(key.to_bytes());
            let public = openssh_public_key(
                &key.verifying_key().to_bytes(),
                &format!("datastack-{customer}"),
            );
            vec![
                generated(format!("{path}-pub"), public),
                generated(path, private),
            ]
        }
    }
}

fn random_string<R: Rng>(rng: &mut R, length: usize, charset: Charset) -> String {
    let alphabet = charset.alphabet();
    (0..length)
        .map(|_| char::from(alphabet[rng.gen_range(0..alphabet.len())]))
        .collect()
}

/// Encode an ed25519 public key as an OpenSSH `authorized_keys` line.
#[must_use]
pub fn openssh_public_key(public: &[u8; 32], comment: &str) -> String {
    const KEY_TYPE: &[u8] = b"ssh-ed25519";
    let mut wire = Vec::with_capacity(4 + KEY_TYPE.len() + 4 + public.len());
    wire.extend_from_slice(&u32::try_from(KEY_TYPE.len()).unwrap_or(11).to_be_bytes());
    wire.extend_from_slice(KEY_TYPE);
    wire.extend_from_slice(&32u32.to_be_bytes());
    wire.extend_from_slice(public);
    format!("ssh-ed25519 {} {comment}", STANDARD.encode(wire))
}
