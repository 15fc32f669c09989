//! Secure signing-key handling with automatic zeroization.
//!
//! Keys are platform-agnostic byte strings; the platform adapter decides how
//! to interpret them. The material is zeroized when the wrapper is dropped.

use secrecy::{ExposeSecret, Secret};
use std::fmt;

/// Error type for key operations.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid key size: expected {expected}, got {got}")]
    InvalidKeySize { expected: usize, got: usize },

    #[error("Invalid key format: {0}")]
    InvalidFormat(String),
}

/// Length of a secp256k1 / P-256 style scalar.
pub const SCALAR_KEY_LEN: usize = 32;

/// Secure wrapper for a private signing key.
pub struct PrivateKey {
    inner: Secret<Vec<u8>>,
}

impl PrivateKey {
    /// Create from raw 32-byte scalar bytes.
    ///
    /// The input bytes are copied; the caller owns zeroizing the original.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != SCALAR_KEY_LEN {
            return Err(KeyError::InvalidKeySize {
                expected: SCALAR_KEY_LEN,
                got: bytes.len(),
            });
        }
        Ok(Self {
            inner: Secret::new(bytes.to_vec()),
        })
    }

    /// Create from a hex string, with or without a `0x` prefix.
    pub fn from_hex(hex_key: &str) -> Result<Self, KeyError> {
        let trimmed = hex_key.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let mut bytes = hex::decode(digits).map_err(|e| KeyError::InvalidFormat(e.to_string()))?;
        let key = Self::from_bytes(&bytes);
        bytes.iter_mut().for_each(|b| *b = 0);
        key
    }

    /// Create from a SEC1 `EC PRIVATE KEY` PEM document (secp256k1).
    pub fn from_sec1_pem(pem_content: &str) -> Result<Self, KeyError> {
        let parsed = pem::parse(pem_content.as_bytes())
            .map_err(|e| KeyError::InvalidFormat(e.to_string()))?;

        if parsed.tag() != "EC PRIVATE KEY" {
            return Err(KeyError::InvalidFormat(format!(
                "Expected EC PRIVATE KEY, got {}",
                parsed.tag()
            )));
        }

        let secret_key = k256::SecretKey::from_sec1_der(parsed.contents())
            .map_err(|e| KeyError::InvalidFormat(e.to_string()))?;

        Self::from_bytes(secret_key.to_bytes().as_slice())
    }

    /// Borrow the raw key bytes. Only platform adapters should call this.
    pub(crate) fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("inner", &"[REDACTED]")
            .finish()
    }
}
