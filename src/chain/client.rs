//! Certificate lookup for chain walks.
//!
//! A walk asks for "the certificate named `name` issued by `address`" at
//! every hop. Where certificates come from (a ledger index, a directory
//! service, local storage) is hidden behind `CertificateLookup`.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};

use crate::certificate::codec::CertificateEnvelope;
use crate::certificate::inspector::{CertificateSource, Inspector};
use crate::certificate::types::cache_key;
use crate::chain::error::ChainError;
use crate::modules::storage::{Storage, CERTIFICATES};

/// Source of certificates for chain walks.
///
/// This trait abstracts the remote lookup to enable testing with in-memory
/// implementations.
#[async_trait]
pub trait CertificateLookup: Send + Sync {
    /// Certificate for subject `name` signed by `issuer_address`, if any.
    async fn find(
        &self,
        name: &str,
        issuer_address: &str,
    ) -> Result<Option<CertificateEnvelope>, ChainError>;
}

/// Lookup over certificates published into storage.
pub struct StoredLookup {
    storage: Arc<dyn Storage>,
}

impl StoredLookup {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Publish `envelope` under `subject;issuerAddress`, returning the key.
    ///
    /// The envelope is inspected to learn its issuer. It is not verified;
    /// walks verify every link they use.
    pub async fn publish(
        &self,
        inspector: &Inspector<'_>,
        envelope: &CertificateEnvelope,
    ) -> Result<String, ChainError> {
        let inspection = inspector
            .inspect(&CertificateSource::Envelope(envelope.clone()))
            .await?;
        let key = inspection.cache_key();
        self.storage
            .put(CERTIFICATES, &key, &envelope.to_json()?)
            .await?;
        info!("Published certificate {}", key);
        Ok(key)
    }

    /// Withdraw a published certificate. Returns `true` if it existed.
    pub async fn withdraw(&self, name: &str, issuer_address: &str) -> Result<bool, ChainError> {
        let key = cache_key(name, issuer_address);
        let removed = self.storage.remove(CERTIFICATES, &key).await?;
        if removed {
            info!("Withdrew certificate {}", key);
        }
        Ok(removed)
    }
}

#[async_trait]
impl CertificateLookup for StoredLookup {
    async fn find(
        &self,
        name: &str,
        issuer_address: &str,
    ) -> Result<Option<CertificateEnvelope>, ChainError> {
        let key = cache_key(name, issuer_address);
        debug!("Looking up certificate {}", key);

        match self.storage.get(CERTIFICATES, &key).await? {
            Some(json) => CertificateEnvelope::from_json(&json)
                .map(Some)
                .map_err(|e| ChainError::Malformed {
                    key,
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }
}
