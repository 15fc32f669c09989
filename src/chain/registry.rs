//! Registry of trusted certificate authorities.
//!
//! Authorities are only ever chain-walk seeds. A CA certificate is inspected
//! and verified before it is written, so the registry never holds an
//! authority that would fail its own self-signature check.

use std::sync::Arc;

use log::{info, warn};

use crate::certificate::codec::CertificateEnvelope;
use crate::certificate::inspector::CertificateSource;
use crate::certificate::types::{cache_key, CertificateKind};
use crate::certificate::verifier::{Verdict, Verifier};
use crate::chain::error::ChainError;
use crate::chain::types::CertificateAuthority;
use crate::modules::platform::PlatformRegistry;
use crate::modules::storage::{Storage, AUTHORITIES};
use crate::naming::extract_path;

pub struct CaRegistry {
    storage: Arc<dyn Storage>,
}

impl CaRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Verify a CA certificate and register it as a trusted root.
    pub async fn add(
        &self,
        verifier: &Verifier<'_>,
        envelope: &CertificateEnvelope,
    ) -> Result<CertificateAuthority, ChainError> {
        let inspection = verifier
            .inspector()
            .inspect(&CertificateSource::Envelope(envelope.clone()))
            .await?;
        let certificate = &inspection.certificate;
        if certificate.kind != CertificateKind::Ca {
            return Err(ChainError::NotAnAuthority(format!(
                "{} is a {}",
                certificate.subject.name, certificate.kind
            )));
        }
        if let Verdict::Rejected(rejection) = verifier.verify(&inspection, None) {
            return Err(ChainError::AuthorityRejected(rejection));
        }

        let authority = CertificateAuthority {
            name: certificate.subject.name.clone(),
            root_address: inspection.authority_address().to_string(),
            forward: certificate.for_address.clone(),
            serialized_certificate: envelope.to_json()?,
        };
        let record = serde_json::to_string(&authority).map_err(|e| ChainError::Malformed {
            key: authority.key(),
            reason: e.to_string(),
        })?;
        self.storage.put(AUTHORITIES, &authority.key(), &record).await?;

        info!(
            "Registered certificate authority {} at {}",
            authority.name, authority.root_address
        );
        Ok(authority)
    }

    /// Remove a trusted root. Returns `true` if it was registered.
    pub async fn remove(&self, name: &str, root_address: &str) -> Result<bool, ChainError> {
        let removed = self
            .storage
            .remove(AUTHORITIES, &cache_key(name, root_address))
            .await?;
        if removed {
            info!("Removed certificate authority {} at {}", name, root_address);
        }
        Ok(removed)
    }

    pub async fn get(
        &self,
        name: &str,
        root_address: &str,
    ) -> Result<Option<CertificateAuthority>, ChainError> {
        let key = cache_key(name, root_address);
        match self.storage.get(AUTHORITIES, &key).await? {
            Some(record) => Ok(Some(parse_record(&key, &record)?)),
            None => Ok(None),
        }
    }

    /// All registered authorities, ordered by key.
    pub async fn list(&self) -> Result<Vec<CertificateAuthority>, ChainError> {
        self.storage
            .list_all(AUTHORITIES)
            .await?
            .iter()
            .map(|(key, record)| parse_record(key, record))
            .collect()
    }

    /// Authorities trusted for subjects on `subject_platform`, ordered by key.
    pub async fn candidates_for(
        &self,
        subject_platform: &str,
        platforms: &PlatformRegistry,
    ) -> Result<Vec<CertificateAuthority>, ChainError> {
        let mut candidates = Vec::new();
        for authority in self.list().await? {
            match extract_path(&authority.name) {
                Ok((_, platform)) if platforms.is_compatible(subject_platform, &platform) => {
                    candidates.push(authority)
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping authority with malformed name {}: {}", authority.name, e),
            }
        }
        Ok(candidates)
    }
}

fn parse_record(key: &str, record: &str) -> Result<CertificateAuthority, ChainError> {
    serde_json::from_str(record).map_err(|e| ChainError::Malformed {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
