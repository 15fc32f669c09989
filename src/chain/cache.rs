//! Inspection cache for chain walks.
//!
//! Inspecting a certificate means decompressing it and recovering several
//! signers. Walks revisit the same upper links constantly, so inspection
//! records are kept in memory (and optionally mirrored into storage) keyed by
//! `name;signatureAddress`. Every entry carries an integrity tag; an entry
//! whose tag does not match is dropped. Cached records are still re-verified
//! by the walker before use.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::certificate::types::{cache_key, Inspection};
use crate::chain::error::CacheError;
use crate::modules::config::Settings;
use crate::modules::storage::{Storage, INSPECTIONS};

/// Inspection cache with in-memory TTL eviction and an optional storage mirror.
pub struct InspectionCache {
    /// In-memory cache of serialized inspection records.
    cache: Cache<String, CachedEntry>,

    /// Secret mixed into integrity tags.
    secret: [u8; 32],

    /// Mirror for entries that should outlive the process.
    storage: Option<Arc<dyn Storage>>,
}

/// A cached inspection blob with integrity protection.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedEntry {
    blob: String,
    #[serde(with = "hex_tag")]
    integrity_tag: [u8; 32],
}

mod hex_tag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(tag: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(tag))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("integrity tag must be 32 bytes"))
    }
}

impl InspectionCache {
    /// Create an in-memory cache.
    ///
    /// # Arguments
    /// * `secret` - 32-byte secret for integrity tags
    /// * `ttl` - how long an entry stays in memory
    /// * `capacity` - maximum number of in-memory entries
    pub fn new(secret: [u8; 32], ttl: Duration, capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self {
            cache,
            secret,
            storage: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.cache_secret,
            settings.inspection_cache_ttl,
            settings.inspection_cache_capacity,
        )
    }

    /// Mirror entries into the `inspections` collection of `storage`.
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Store an inspection record.
    pub async fn store(&self, inspection: &Inspection) -> Result<(), CacheError> {
        let key = inspection.cache_key();
        let blob = serde_json::to_string(inspection).map_err(|e| CacheError::Encode(e.to_string()))?;
        let entry = CachedEntry {
            integrity_tag: self.compute_integrity_tag(&key, &blob),
            blob,
        };

        if let Some(storage) = &self.storage {
            let value = serde_json::to_string(&entry).map_err(|e| CacheError::Encode(e.to_string()))?;
            storage.put(INSPECTIONS, &key, &value).await?;
        }
        self.cache.insert(key, entry).await;
        Ok(())
    }

    /// Retrieve the inspection of `name` signed by `signature_address`.
    ///
    /// Returns `None` if not found or the integrity check fails.
    pub async fn get(&self, name: &str, signature_address: &str) -> Option<Inspection> {
        let key = cache_key(name, signature_address);

        if let Some(entry) = self.cache.get(&key).await {
            match self.open(&key, &entry) {
                Ok(inspection) => {
                    debug!("Inspection cache hit for {}", key);
                    return Some(inspection);
                }
                Err(e) => {
                    warn!("Dropping cached inspection {}: {}", key, e);
                    self.cache.invalidate(&key).await;
                }
            }
        }

        let entry = self.load(&key).await?;
        match self.open(&key, &entry) {
            Ok(inspection) => {
                debug!("Inspection storage hit for {}", key);
                self.cache.insert(key, entry).await;
                Some(inspection)
            }
            Err(e) => {
                warn!("Ignoring stored inspection {}: {}", key, e);
                None
            }
        }
    }

    /// Invalidate one entry in memory and storage.
    pub async fn invalidate(&self, name: &str, signature_address: &str) -> Result<(), CacheError> {
        let key = cache_key(name, signature_address);
        self.cache.invalidate(&key).await;
        if let Some(storage) = &self.storage {
            storage.remove(INSPECTIONS, &key).await?;
        }
        Ok(())
    }

    async fn load(&self, key: &str) -> Option<CachedEntry> {
        let storage = self.storage.as_ref()?;
        match storage.get(INSPECTIONS, key).await {
            Ok(Some(value)) => serde_json::from_str(&value)
                .map_err(|e| warn!("Malformed stored inspection {}: {}", key, e))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!("Inspection storage unavailable: {}", e);
                None
            }
        }
    }

    fn open(&self, key: &str, entry: &CachedEntry) -> Result<Inspection, CacheError> {
        let expected_tag = self.compute_integrity_tag(key, &entry.blob);
        if !constant_time_eq(&entry.integrity_tag, &expected_tag) {
            return Err(CacheError::IntegrityFailed);
        }
        serde_json::from_str(&entry.blob).map_err(|e| CacheError::Encode(e.to_string()))
    }

    /// Integrity tag over the key and the serialized record.
    fn compute_integrity_tag(&self, key: &str, blob: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.secret);
        hasher.update((key.len() as u64).to_le_bytes());
        hasher.update(key.as_bytes());
        hasher.update(blob.as_bytes());
        hasher.finalize().into()
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
