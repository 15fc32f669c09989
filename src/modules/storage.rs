//! Key-value persistence for the CA registry and certificate caches.
//!
//! A storage handle is created by the caller and passed to every component
//! that persists anything. Each write is a single atomic operation; readers
//! never observe a half-written value.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::RwLock;

/// Collection holding trusted certificate authorities.
pub const AUTHORITIES: &str = "authorities";
/// Collection holding published certificate envelopes.
pub const CERTIFICATES: &str = "certificates";
/// Collection holding cached inspection blobs.
pub const INSPECTIONS: &str = "inspections";

/// Redis key prefix; one hash per collection.
const REDIS_KEY_PREFIX: &str = "addrcert:";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Redis operation failed: {0}")]
    RedisError(String),
}

impl From<redis::RedisError> for StorageError {
    fn from(e: redis::RedisError) -> Self {
        StorageError::RedisError(e.to_string())
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<String>, StorageError>;

    async fn put(&self, collection: &str, key: &str, value: &str) -> Result<(), StorageError>;

    /// Returns `true` when a value was removed.
    async fn remove(&self, collection: &str, key: &str) -> Result<bool, StorageError>;

    /// All `(key, value)` pairs, sorted by key.
    async fn list_all(&self, collection: &str) -> Result<Vec<(String, String)>, StorageError>;
}

/// In-process storage.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    collections: Arc<RwLock<HashMap<String, HashMap<String, String>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<String>, StorageError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(&self, collection: &str, key: &str, value: &str) -> Result<(), StorageError> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, collection: &str, key: &str) -> Result<bool, StorageError> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .and_then(|entries| entries.remove(key))
            .is_some())
    }

    async fn list_all(&self, collection: &str) -> Result<Vec<(String, String)>, StorageError> {
        let collections = self.collections.read().await;
        let mut entries: Vec<(String, String)> = collections
            .get(collection)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

/// Redis-backed storage, one hash per collection.
pub struct RedisStorage {
    redis_client: Arc<redis::Client>,
}

impl RedisStorage {
    pub fn new(redis_client: Arc<redis::Client>) -> Self {
        Self { redis_client }
    }

    pub fn open(redis_url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self::new(Arc::new(client)))
    }

    fn hash_key(collection: &str) -> String {
        format!("{}{}", REDIS_KEY_PREFIX, collection)
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.hget(Self::hash_key(collection), key).await?;
        debug!("redis HGET {}:{} hit={}", collection, key, value.is_some());
        Ok(value)
    }

    async fn put(&self, collection: &str, key: &str, value: &str) -> Result<(), StorageError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.hset(Self::hash_key(collection), key, value).await?;
        Ok(())
    }

    async fn remove(&self, collection: &str, key: &str) -> Result<bool, StorageError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let removed: u64 = conn.hdel(Self::hash_key(collection), key).await?;
        Ok(removed > 0)
    }

    async fn list_all(&self, collection: &str) -> Result<Vec<(String, String)>, StorageError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let entries: HashMap<String, String> = conn.hgetall(Self::hash_key(collection)).await?;
        let mut entries: Vec<(String, String)> = entries.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}
