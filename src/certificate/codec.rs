//! Certificate envelope: `{format, certificate, signature}`.
//!
//! The certificate is canonical JSON, zlib-compressed and base64 encoded. The
//! issuer signs the hex SHA-256 of the compressed bytes, so any change to the
//! bytes either breaks decompression or changes the recovered issuer.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::certificate::error::CertificateError;
use crate::certificate::types::Certificate;
use crate::modules::crypto::{base64_decode, base64_encode, compress, decompress, sha256_hex};
use crate::modules::platform::Platform;
use crate::modules::secure_keys::PrivateKey;

/// The only envelope format this crate reads or writes.
pub const COMPRESSED_FORMAT: &str = "compressed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateEnvelope {
    pub format: String,
    pub certificate: String,
    pub signature: String,
}

/// Canonical compressed bytes of a certificate.
pub fn encode_certificate(certificate: &Certificate) -> Result<Vec<u8>, CertificateError> {
    let json =
        serde_json::to_vec(certificate).map_err(|e| CertificateError::Encode(e.to_string()))?;
    Ok(compress(&json)?)
}

/// Message the issuer signs for the given compressed bytes.
pub fn issuer_message(compressed: &[u8]) -> String {
    sha256_hex(compressed)
}

impl CertificateEnvelope {
    /// Compress `certificate` and sign it with the issuer key.
    pub fn seal(
        certificate: &Certificate,
        platform: &dyn Platform,
        issuer_key: &PrivateKey,
    ) -> Result<Self, CertificateError> {
        let compressed = encode_certificate(certificate)?;
        let signature = platform.sign(issuer_key, issuer_message(&compressed).as_bytes())?;
        Ok(Self {
            format: COMPRESSED_FORMAT.to_string(),
            certificate: base64_encode(&compressed),
            signature,
        })
    }

    /// Raw compressed bytes, after checking the format tag.
    pub fn compressed_bytes(&self) -> Result<Vec<u8>, CertificateError> {
        if self.format != COMPRESSED_FORMAT {
            return Err(CertificateError::UnknownFormat(self.format.clone()));
        }
        base64_decode(&self.certificate)
            .map_err(|e| CertificateError::Decode(format!("invalid base64: {e}")))
    }

    /// Decompress and parse the certificate, returning it with the exact
    /// compressed bytes the issuer signed.
    pub fn open(&self) -> Result<(Certificate, Vec<u8>), CertificateError> {
        let compressed = self.compressed_bytes()?;
        let json = decompress(&compressed)
            .map_err(|e| CertificateError::Decode(format!("payload integrity check failed: {e}")))?;
        let certificate = serde_json::from_slice(&json)
            .map_err(|e| CertificateError::Decode(format!("invalid certificate JSON: {e}")))?;
        Ok((certificate, compressed))
    }

    pub fn to_json(&self) -> Result<String, CertificateError> {
        serde_json::to_string(self).map_err(|e| CertificateError::Encode(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CertificateError> {
        serde_json::from_str(json)
            .map_err(|e| CertificateError::Decode(format!("invalid envelope: {e}")))
    }

    pub async fn read_file(path: &Path) -> Result<Self, CertificateError> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    /// Write the envelope as JSON, via a temporary file and rename so readers
    /// never see a partial file.
    pub async fn write_file(&self, path: &Path) -> Result<(), CertificateError> {
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, self.to_json()?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
