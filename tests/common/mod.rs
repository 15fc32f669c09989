#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;

use addrcert::certificate::{sign_mark, Identity};
use addrcert::modules::crypto::sha256_hex;
use addrcert::modules::image::{ImageBinding, ImageError, MarkGeometry};
use addrcert::modules::platform::{Platform, PlatformRegistry};
use addrcert::modules::secure_keys::PrivateKey;
use async_trait::async_trait;
use tokio::sync::RwLock;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Pixels, embedded payload, code and mark of one in-memory image.
#[derive(Debug, Clone, Default)]
pub struct FakeImage {
    pub pixels: Vec<u8>,
    pub payload: Option<String>,
    pub code: Option<u64>,
    pub mark: Option<String>,
}

/// In-memory stand-in for the steganographic image codec.
#[derive(Clone, Default)]
pub struct MemoryImages {
    images: Arc<RwLock<HashMap<PathBuf, FakeImage>>>,
}

impl MemoryImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, path: impl Into<PathBuf>, image: FakeImage) {
        self.images.write().await.insert(path.into(), image);
    }

    pub async fn get(&self, path: &Path) -> Option<FakeImage> {
        self.images.read().await.get(path).cloned()
    }

    async fn require(&self, path: &Path) -> Result<FakeImage, ImageError> {
        self.get(path)
            .await
            .ok_or_else(|| ImageError::NotFound(path.display().to_string()))
    }
}

#[async_trait]
impl ImageBinding for MemoryImages {
    async fn image_hash(&self, path: &Path) -> Result<String, ImageError> {
        Ok(sha256_hex(&self.require(path).await?.pixels))
    }

    async fn embed(&self, path: &Path, payload: &str, output_path: &Path) -> Result<(), ImageError> {
        let mut image = self.require(path).await?;
        image.payload = Some(payload.to_string());
        self.insert(output_path, image).await;
        Ok(())
    }

    async fn extract(&self, path: &Path) -> Result<Option<String>, ImageError> {
        Ok(self.require(path).await?.payload)
    }

    async fn extract_code(&self, path: &Path) -> Result<u64, ImageError> {
        self.require(path).await?.code.ok_or(ImageError::Missing("code"))
    }

    async fn extract_mark(&self, path: &Path, _geometry: MarkGeometry) -> Result<String, ImageError> {
        self.require(path)
            .await?
            .mark
            .ok_or(ImageError::Missing("signature mark"))
    }
}

/// Image adapter whose every call hangs.
pub struct StalledImages;

impl StalledImages {
    async fn stall<T>() -> Result<T, ImageError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(ImageError::Codec("stalled".to_string()))
    }
}

#[async_trait]
impl ImageBinding for StalledImages {
    async fn image_hash(&self, _path: &Path) -> Result<String, ImageError> {
        Self::stall().await
    }

    async fn embed(&self, _path: &Path, _payload: &str, _output_path: &Path) -> Result<(), ImageError> {
        Self::stall().await
    }

    async fn extract(&self, _path: &Path) -> Result<Option<String>, ImageError> {
        Self::stall().await
    }

    async fn extract_code(&self, _path: &Path) -> Result<u64, ImageError> {
        Self::stall().await
    }

    async fn extract_mark(&self, _path: &Path, _geometry: MarkGeometry) -> Result<String, ImageError> {
        Self::stall().await
    }
}

pub fn eth(platforms: &PlatformRegistry) -> Arc<dyn Platform> {
    platforms.get("eth").unwrap().clone()
}

pub fn identity(name: &str) -> Identity {
    Identity::new(name, "Example Org", "US", "Austin").with_state("TX")
}

/// Store an image whose mark is signed by `key` for `subject_name`.
pub async fn marked_image(
    images: &MemoryImages,
    path: &str,
    platform: &dyn Platform,
    key: &PrivateKey,
    code: u64,
    subject_name: &str,
) {
    let mark = sign_mark(platform, key, code, subject_name).unwrap();
    images
        .insert(
            path,
            FakeImage {
                pixels: format!("pixels of {path}").into_bytes(),
                payload: None,
                code: Some(code),
                mark: Some(mark),
            },
        )
        .await;
}

/// Store a plain image with no code or mark.
pub async fn plain_image(images: &MemoryImages, path: &str) {
    images
        .insert(
            path,
            FakeImage {
                pixels: format!("pixels of {path}").into_bytes(),
                ..FakeImage::default()
            },
        )
        .await;
}
