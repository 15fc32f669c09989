//! Error types for chain resolution.

use thiserror::Error;

use crate::certificate::error::CertificateError;
use crate::certificate::verifier::Rejection;
use crate::modules::platform::PlatformError;
use crate::modules::storage::StorageError;
use crate::naming::NameError;

/// Errors raised while registering authorities or walking chains.
///
/// A chain that cannot be completed is not an error; see `ChainStatus`.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    #[error("Invalid name: {0}")]
    Name(#[from] NameError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Not a CA certificate: {0}")]
    NotAnAuthority(String),

    #[error("CA certificate rejected: {0}")]
    AuthorityRejected(Rejection),

    #[error("Malformed stored record {key}: {reason}")]
    Malformed { key: String, reason: String },
}

/// Errors related to cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache integrity check failed")]
    IntegrityFailed,

    #[error("Cache entry could not be encoded: {0}")]
    Encode(String),

    #[error("Cache storage failed: {0}")]
    Storage(#[from] StorageError),
}
