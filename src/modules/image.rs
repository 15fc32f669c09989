//! Image binding adapter.
//!
//! Domain, address and token certificates are anchored to an image: the
//! image carries a hash-protected steganographic payload (the certificate
//! envelope), a numeric code and a signature mark painted into a fixed pixel
//! region. The codec lives outside this crate; these are the operations the
//! certificate protocol consumes.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::modules::config::Settings;

/// Errors raised by image adapters.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Image I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image has no embedded {0}")]
    Missing(&'static str),

    #[error("Image codec error: {0}")]
    Codec(String),

    #[error("Image operation aborted: {0}")]
    Aborted(String),
}

/// Time limit and cancellation for calls into an image adapter.
#[derive(Debug, Clone)]
pub struct ImageDeadline {
    timeout: Duration,
    cancel: CancellationToken,
}

impl Default for ImageDeadline {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::modules::config::DEFAULT_IMAGE_TIMEOUT_SECS))
    }
}

impl ImageDeadline {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.image_timeout)
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run one adapter call. Cancellation or the timeout yields
    /// `ImageError::Aborted`.
    pub async fn run<T, F>(&self, operation: &str, call: F) -> Result<T, ImageError>
    where
        F: Future<Output = Result<T, ImageError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(ImageError::Aborted(format!("{operation} cancelled")))
            }
            result = tokio::time::timeout(self.timeout, call) => {
                result.map_err(|_| {
                    ImageError::Aborted(format!("{operation} timed out after {:?}", self.timeout))
                })?
            }
        }
    }
}

/// Pixel region holding the signature mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkGeometry {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for MarkGeometry {
    /// Top-left strip, two pixels per signature byte.
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 130,
            height: 4,
        }
    }
}

/// Build the message a signature mark signs: `"<code>\r\n<subject name>"`.
pub fn mark_message(code: u64, subject_name: &str) -> String {
    format!("{code}\r\n{subject_name}")
}

#[async_trait]
pub trait ImageBinding: Send + Sync {
    /// Hex SHA-256 of the image content, excluding embedded payload and mark.
    async fn image_hash(&self, path: &Path) -> Result<String, ImageError>;

    /// Write a copy of `path` carrying `payload` to `output_path`.
    async fn embed(&self, path: &Path, payload: &str, output_path: &Path) -> Result<(), ImageError>;

    /// Embedded payload, if any.
    async fn extract(&self, path: &Path) -> Result<Option<String>, ImageError>;

    /// Embedded numeric code.
    async fn extract_code(&self, path: &Path) -> Result<u64, ImageError>;

    /// Signature mark painted in `geometry`.
    async fn extract_mark(&self, path: &Path, geometry: MarkGeometry) -> Result<String, ImageError>;
}
