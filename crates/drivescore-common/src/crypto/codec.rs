//! Encrypted field codec
//!
//! Per-scalar authenticated encryption of coordinates at rest:
//! - ChaCha20-Poly1305 with a fresh random nonce per value
//! - plaintext is the 8-byte little-endian IEEE-754 encoding, so round-trips are bit-exact
//! - token = base64(version ‖ nonce ‖ ciphertext+tag)
//!
//! Decryption never fails loudly: a malformed, truncated, tampered or
//! foreign token decodes to `None`, so one corrupt value cannot abort a read.

use std::fmt;
use std::path::Path;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CryptoError, DrivescoreError, Result};

/// Symmetric key length in bytes
pub const KEY_LEN: usize = 32;

const TOKEN_VERSION: u8 = 0x01;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const VALUE_LEN: usize = 8;
const TOKEN_LEN: usize = 1 + NONCE_LEN + VALUE_LEN + TAG_LEN;

/// Opaque ciphertext wrapping one floating-point value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedScalar(pub String);

impl EncryptedScalar {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EncryptedScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-wide symmetric key, loaded once at startup
#[derive(Clone)]
pub struct KeyMaterial([u8; KEY_LEN]);

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}

impl KeyMaterial {
    /// Build from raw key bytes
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, CryptoError> {
        let key: [u8; KEY_LEN] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: KEY_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(key))
    }

    /// Build from base64 text (standard or URL-safe alphabet)
    pub fn from_base64(text: &str) -> std::result::Result<Self, CryptoError> {
        let text = text.trim();
        let bytes = STANDARD
            .decode(text)
            .or_else(|_| URL_SAFE.decode(text))
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Generate a fresh random key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Base64 text form, as written by [`KeyMaterial::write_new`]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Load the key file.
    ///
    /// Accepts exactly 32 raw bytes or base64 text of 32 bytes. A missing or
    /// malformed key file is a configuration error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            DrivescoreError::Config(format!("key file {} unreadable: {}", path.display(), e))
        })?;

        let key = if bytes.len() == KEY_LEN {
            Self::from_bytes(&bytes)
        } else {
            let text = std::str::from_utf8(&bytes).map_err(|_| {
                DrivescoreError::Config(format!(
                    "key file {} is neither {} raw bytes nor base64 text",
                    path.display(),
                    KEY_LEN
                ))
            })?;
            Self::from_base64(text)
        }
        .map_err(|e| DrivescoreError::Config(format!("key file {}: {}", path.display(), e)))?;

        info!(path = %path.display(), "Loaded field encryption key");
        Ok(key)
    }

    /// Generate a key and write it as base64 text. Refuses to overwrite.
    pub fn write_new(path: impl AsRef<Path>) -> Result<Self> {
        use std::io::Write;

        let path = path.as_ref();
        let key = Self::generate();
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(key.to_base64().as_bytes())?;
        file.sync_all()?;

        info!(path = %path.display(), "Wrote new field encryption key");
        Ok(key)
    }
}

/// Stateless per-scalar encrypt/decrypt. Reentrant; share it by `Arc`.
#[derive(Clone)]
pub struct FieldCodec {
    cipher: ChaCha20Poly1305,
}

impl fmt::Debug for FieldCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCodec").finish_non_exhaustive()
    }
}

impl FieldCodec {
    pub fn new(key: &KeyMaterial) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key.0)),
        }
    }

    /// Encrypt one value. Missing values (`None`, NaN) produce no ciphertext.
    pub fn encrypt(
        &self,
        value: Option<f64>,
    ) -> std::result::Result<Option<EncryptedScalar>, CryptoError> {
        let Some(value) = value.filter(|v| !v.is_nan()) else {
            return Ok(None);
        };

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), value.to_le_bytes().as_slice())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut token = Vec::with_capacity(TOKEN_LEN);
        token.push(TOKEN_VERSION);
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);

        Ok(Some(EncryptedScalar(STANDARD.encode(token))))
    }

    /// Decrypt one value; `None` for anything that does not authenticate.
    pub fn decrypt(&self, token: &EncryptedScalar) -> Option<f64> {
        self.decrypt_str(token.as_str())
    }

    /// Decrypt a raw token string; `None` for anything that does not authenticate.
    pub fn decrypt_str(&self, token: &str) -> Option<f64> {
        let bytes = STANDARD.decode(token.trim()).ok()?;
        if bytes.len() != TOKEN_LEN || bytes[0] != TOKEN_VERSION {
            debug!(len = bytes.len(), "Rejected malformed ciphertext");
            return None;
        }

        let nonce = &bytes[1..1 + NONCE_LEN];
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), &bytes[1 + NONCE_LEN..])
            .ok()?;

        let value: [u8; VALUE_LEN] = plaintext.as_slice().try_into().ok()?;
        Some(f64::from_le_bytes(value))
    }

    /// Decrypt an optional token; a missing token stays missing.
    pub fn decrypt_opt(&self, token: Option<&EncryptedScalar>) -> Option<f64> {
        token.and_then(|t| self.decrypt(t))
    }

    /// Decrypt a column. Output has the same length as the input; every
    /// value that fails on its own becomes `None`.
    pub fn decrypt_many(&self, tokens: &[Option<EncryptedScalar>]) -> Vec<Option<f64>> {
        tokens.iter().map(|t| self.decrypt_opt(t.as_ref())).collect()
    }
}
