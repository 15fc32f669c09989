//! Runtime settings loaded from the environment.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use thiserror::Error;

use crate::modules::crypto::random_secret;
use crate::modules::storage::{MemoryStorage, RedisStorage, Storage, StorageError};

const DEFAULT_LOOKUP_TIMEOUT_SECS: u64 = 10;
pub(crate) const DEFAULT_IMAGE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("Storage unavailable: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub redis_url: Option<String>,
    pub lookup_timeout: Duration,
    pub image_timeout: Duration,
    pub inspection_cache_ttl: Duration,
    pub inspection_cache_capacity: u64,
    pub cache_secret: [u8; 32],
    pub enable_timing_logs: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redis_url: None,
            lookup_timeout: Duration::from_secs(DEFAULT_LOOKUP_TIMEOUT_SECS),
            image_timeout: Duration::from_secs(DEFAULT_IMAGE_TIMEOUT_SECS),
            inspection_cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            inspection_cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_secret: random_secret(),
            enable_timing_logs: false,
        }
    }
}

impl Settings {
    /// Load settings from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let redis_url = env::var("REDIS_URL").ok().filter(|url| !url.is_empty());

        let lookup_timeout = Duration::from_secs(parse_u64(
            "LOOKUP_TIMEOUT_SECS",
            DEFAULT_LOOKUP_TIMEOUT_SECS,
        )?);
        let image_timeout = Duration::from_secs(parse_u64(
            "IMAGE_TIMEOUT_SECS",
            DEFAULT_IMAGE_TIMEOUT_SECS,
        )?);
        let inspection_cache_ttl = Duration::from_secs(parse_u64(
            "INSPECTION_CACHE_TTL_SECS",
            DEFAULT_CACHE_TTL_SECS,
        )?);
        let inspection_cache_capacity =
            parse_u64("INSPECTION_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)?;

        let cache_secret = match env::var("CACHE_SECRET") {
            Ok(value) => parse_secret(&value)?,
            Err(_) => defaults.cache_secret,
        };

        let enable_timing_logs = env::var("ENABLE_TIMING_LOGS")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        info!(
            "Settings loaded: storage={}, lookup_timeout={:?}, cache_ttl={:?}",
            if redis_url.is_some() { "redis" } else { "memory" },
            lookup_timeout,
            inspection_cache_ttl
        );

        Ok(Self {
            redis_url,
            lookup_timeout,
            image_timeout,
            inspection_cache_ttl,
            inspection_cache_capacity,
            cache_secret,
            enable_timing_logs,
        })
    }

    /// Open the configured storage backend.
    pub fn open_storage(&self) -> Result<Arc<dyn Storage>, ConfigError> {
        match &self.redis_url {
            Some(url) => Ok(Arc::new(RedisStorage::open(url)?)),
            None => Ok(Arc::new(MemoryStorage::new())),
        }
    }

    pub fn log_timing(&self, message: &str, duration: Duration) {
        if self.enable_timing_logs {
            info!("{}: {:?}", message, duration);
        }
    }
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected: "a non-negative integer",
            value,
        }),
        Err(_) => Ok(default),
    }
}

fn parse_secret(value: &str) -> Result<[u8; 32], ConfigError> {
    let invalid = || ConfigError::Invalid {
        name: "CACHE_SECRET",
        expected: "64 hex characters",
        value: value.to_string(),
    };
    let bytes = hex::decode(value.trim()).map_err(|_| invalid())?;
    bytes.try_into().map_err(|_| invalid())
}
