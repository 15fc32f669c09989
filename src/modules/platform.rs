//! Ledger platform adapters.
//!
//! A platform knows how to turn a key into an address, sign a message and
//! recover the signer of a signature. Addresses derived from a contract
//! deployment differ from the deployer's key address, so every derivation and
//! comparison takes an optional deployment nonce.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::modules::eth::EthPlatform;
use crate::modules::secure_keys::PrivateKey;

/// Errors raised by platform adapters.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Signer recovery failed: {0}")]
    RecoveryFailed(String),
}

/// Per-ledger signing and addressing capability.
pub trait Platform: Send + Sync {
    /// Registered platform identifier, e.g. `eth` or `eth:goerli`.
    fn name(&self) -> &str;

    /// Generate a fresh private key.
    fn generate_key(&self) -> Result<PrivateKey, PlatformError>;

    /// Address controlled by `key`; with a nonce, the contract address that
    /// key deploys at that nonce.
    fn address(&self, key: &PrivateKey, nonce: Option<u64>) -> Result<String, PlatformError>;

    /// Sign `message` with `key`.
    fn sign(&self, key: &PrivateKey, message: &[u8]) -> Result<String, PlatformError>;

    /// Recover the signer address of `signature` over `message`; with a nonce,
    /// the contract address the signer deploys at that nonce.
    fn recover(
        &self,
        signature: &str,
        message: &[u8],
        nonce: Option<u64>,
    ) -> Result<String, PlatformError>;

    /// Address equality. With a nonce, `a` and `b` are also equal when one is
    /// the contract the other deploys at that nonce.
    fn addresses_equal(&self, a: &str, b: &str, nonce: Option<u64>) -> bool;

    /// Platforms whose certificates this platform trusts as issuers.
    fn compatible_platforms(&self) -> &[String];

    fn is_valid_address(&self, address: &str) -> bool;

    fn is_valid_signature(&self, signature: &str) -> bool;

    /// Platform-specific path grammar.
    fn is_valid_path(&self, path_name: &str) -> bool;
}

/// Registry of known platforms, keyed by name.
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    platforms: HashMap<String, Arc<dyn Platform>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with Ethereum mainnet and the common test networks.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(EthPlatform::mainnet()));
        for network in ["goerli", "sepolia", "holesky"] {
            registry.register(Arc::new(EthPlatform::network(network)));
        }
        registry
    }

    pub fn register(&mut self, platform: Arc<dyn Platform>) {
        self.platforms.insert(platform.name().to_string(), platform);
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn Platform>, PlatformError> {
        self.platforms
            .get(name)
            .ok_or_else(|| PlatformError::UnknownPlatform(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.platforms.contains_key(name)
    }

    /// True when a certificate on `issuer_platform` may issue for a subject on
    /// `subject_platform`.
    pub fn is_compatible(&self, subject_platform: &str, issuer_platform: &str) -> bool {
        if subject_platform == issuer_platform {
            return true;
        }
        self.platforms
            .get(subject_platform)
            .map(|platform| {
                platform
                    .compatible_platforms()
                    .iter()
                    .any(|name| name == issuer_platform)
            })
            .unwrap_or(false)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.platforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformRegistry")
            .field("platforms", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = PlatformRegistry::with_defaults();
        assert!(registry.contains("eth"));
        assert!(registry.contains("eth:goerli"));
        assert!(matches!(
            registry.get("btc"),
            Err(PlatformError::UnknownPlatform(_))
        ));
    }

    #[test]
    fn test_network_trusts_mainnet_issuers() {
        let registry = PlatformRegistry::with_defaults();
        assert!(registry.is_compatible("eth", "eth"));
        assert!(registry.is_compatible("eth:goerli", "eth"));
        assert!(!registry.is_compatible("eth", "eth:goerli"));
        assert!(!registry.is_compatible("eth:goerli", "eth:sepolia"));
    }
}
