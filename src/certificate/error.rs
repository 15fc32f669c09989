//! Error types for request construction, issuance and inspection.

use thiserror::Error;

use crate::modules::image::ImageError;
use crate::modules::platform::PlatformError;
use crate::naming::NameError;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Unknown certificate kind: {0}")]
    UnknownKind(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Request signature does not match request address {expected} (signed by {actual})")]
    RequestSignatureMismatch { expected: String, actual: String },

    #[error("For signature does not match for address {expected} (signed by {actual})")]
    ForSignatureMismatch { expected: String, actual: String },

    #[error("Payload signature does not match request address {expected} (signed by {actual})")]
    PayloadSignatureMismatch { expected: String, actual: String },

    #[error("CA certificate must be self-signed: {0}")]
    NotSelfSigned(String),

    #[error("Issuer {issuer} may not issue for subject {subject}")]
    InvalidIssuerPath { issuer: String, subject: String },

    #[error("Issuer platform {issuer} is not compatible with subject platform {subject}")]
    IncompatiblePlatform { issuer: String, subject: String },

    #[error("Unknown envelope format: {0}")]
    UnknownFormat(String),

    #[error("Certificate decode failed: {0}")]
    Decode(String),

    #[error("Certificate encode failed: {0}")]
    Encode(String),

    #[error("Certificate I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Name error: {0}")]
    Name(#[from] NameError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),
}

impl CertificateError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CertificateError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by undecodable certificate bytes.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            CertificateError::Decode(_) | CertificateError::UnknownFormat(_)
        )
    }

    /// True for malformed names and unregistered platforms.
    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            CertificateError::Name(_)
                | CertificateError::Platform(PlatformError::UnknownPlatform(_))
        )
    }

    /// True when an image call was cancelled or timed out.
    pub fn is_aborted(&self) -> bool {
        matches!(self, CertificateError::Image(ImageError::Aborted(_)))
    }
}
