//! Symmetric authenticated encryption of single artifacts.
//!
//! ChaCha20-Poly1305 with a fresh random nonce per file. The caller passes the
//! file's relative path as associated data, so a ciphertext moved to another
//! path fails to decrypt instead of silently yielding the wrong file.
//!
//! Layout of an encrypted file: `MAGIC (8) | nonce (12) | ciphertext+tag`.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Header identifying files written by this module.
pub const MAGIC: &[u8; 8] = b"DSTKENC1";

/// Extension appended to encrypted files.
pub const ENCRYPTED_EXTENSION: &str = "enc";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// A 256-bit artifact encryption key. `Debug` never prints key material.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Fresh key from the OS random source.
    #[must_use]
    pub fn generate() -> Self {
        let key = ChaCha20Poly1305::generate_key(&mut OsRng);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(key.as_slice());
        Self(bytes)
    }

    /// Parse the base64 form shown to the operator.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not base64 or not 32 bytes long.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let raw = STANDARD
            .decode(encoded.trim())
            .context("encryption key is not valid base64")?;
        let bytes: [u8; KEY_LEN] = raw
            .try_into()
            .map_err(|_| anyhow::anyhow!("encryption key must be {KEY_LEN} bytes"))?;
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// First 16 hex characters of the key's SHA-256; safe to log and commit.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex_encode(&digest[..8])
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey({})", self.fingerprint())
    }
}

/// Encrypt `plaintext`, binding it to `aad`.
///
/// # Errors
///
/// Returns an error if the cipher rejects the input (oversized message).
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = key
        .cipher()
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| anyhow::anyhow!("encryption failed"))?;
    let mut out = Vec::with_capacity(MAGIC.len() + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt data produced by [`encrypt`] with the same key and `aad`.
///
/// # Errors
///
/// Returns an error if the header is missing, the data is truncated, or
/// authentication fails (wrong key, wrong path, or tampering).
pub fn decrypt(key: &EncryptionKey, data: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if data.len() < MAGIC.len() + NONCE_LEN + TAG_LEN {
        anyhow::bail!("encrypted data is truncated");
    }
    let (header, rest) = data.split_at(MAGIC.len());
    if header != MAGIC {
        anyhow::bail!("not a datastack encrypted file");
    }
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
    key.cipher()
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| anyhow::anyhow!("decryption failed: wrong key or modified file"))
}

/// True when `data` starts with the encrypted-file header.
#[must_use]
pub fn is_encrypted(data: &[u8]) -> bool {
    data.starts_with(MAGIC)
}

// ── Tree results ──────────────────────────────────────────────────────────────

/// Files that stay in plaintext when a tree is encrypted.
pub const NON_SENSITIVE_FILES: &[&str] = &["README.md", ".gitignore"];

/// One file encrypted in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncryptedArtifact {
    pub plaintext_path: PathBuf,
    pub ciphertext_path: PathBuf,
    pub key_fingerprint: String,
}

/// A file left alone, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of encrypting a directory tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EncryptedTree {
    pub artifacts: Vec<EncryptedArtifact>,
    pub skipped: Vec<SkippedFile>,
}

/// Why a file with this name and content must not be encrypted, if any.
#[must_use]
pub fn skip_reason(file_name: &str, data: &[u8]) -> Option<&'static str> {
    if NON_SENSITIVE_FILES.contains(&file_name) {
        Some("non-sensitive file")
    } else if data.is_empty() {
        Some("empty file")
    } else if is_encrypted(data) {
        Some("already encrypted")
    } else {
        None
    }
}

/// Encode bytes as lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}
