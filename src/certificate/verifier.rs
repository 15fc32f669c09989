//! Certificate verification.
//!
//! Checks run in a fixed order and stop at the first failure:
//! schema, request signatures, issuer signer, image hash, signature mark,
//! CA self-signature, issuer path and platform.

use std::fmt;

use log::{debug, info, warn};
use thiserror::Error;

use crate::certificate::error::CertificateError;
use crate::certificate::inspector::{CertificateSource, Inspector};
use crate::certificate::issuer::{check_signers, RecoveredSigners};
use crate::certificate::schema::validate_certificate;
use crate::certificate::types::{synthetic_image_hash, CertificateKind, Inspection};
use crate::modules::platform::Platform;
use crate::naming::{is_admissible_issuer, PathPlatformId};

/// Why a certificate was not verified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{0}")]
    Schema(String),

    #[error("Certificate payload is corrupted: {0}")]
    PayloadCorrupted(String),

    #[error("Signature mismatch: {0}")]
    SignatureMismatch(String),

    #[error("Request signature was made by {actual}, not request address {expected}")]
    RequestSignatureMismatch { expected: String, actual: String },

    #[error("For signature was made by {actual}, not for address {expected}")]
    ForSignatureMismatch { expected: String, actual: String },

    #[error("Payload signature was made by {actual}, not {expected}")]
    PayloadSignatureMismatch { expected: String, actual: String },

    #[error("Certificate was signed by {actual}, expected parent {expected}")]
    UnexpectedIssuer { expected: String, actual: String },

    #[error("Image hash mismatch: certificate has {expected}, image hashes to {actual}")]
    ImageHashMismatch { expected: String, actual: String },

    #[error("Image signature mark was made by {actual}, certificate signer is {expected}")]
    SignatureMarkMismatch { expected: String, actual: String },

    #[error("Image carries no signature mark")]
    MissingSignatureMark,

    #[error("CA certificate is not self-signed: {0}")]
    NotSelfSigned(String),

    #[error("Issuer path is invalid: {issuer} may not issue for {subject}")]
    InvalidIssuerPath { issuer: String, subject: String },

    #[error("Issuer platform {issuer} is not compatible with subject platform {subject}")]
    IncompatiblePlatform { issuer: String, subject: String },
}

/// Outcome of verifying a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verdict::Verified)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Verdict::Verified => None,
            Verdict::Rejected(rejection) => Some(rejection),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Verified => f.write_str("Verified"),
            Verdict::Rejected(rejection) => write!(f, "{rejection}"),
        }
    }
}

impl From<Rejection> for Verdict {
    fn from(rejection: Rejection) -> Self {
        Verdict::Rejected(rejection)
    }
}

pub struct Verifier<'a> {
    inspector: Inspector<'a>,
}

impl<'a> Verifier<'a> {
    pub fn new(inspector: Inspector<'a>) -> Self {
        Self { inspector }
    }

    pub fn inspector(&self) -> &Inspector<'a> {
        &self.inspector
    }

    /// Inspect `source` and verify the result.
    ///
    /// Undecodable certificates are rejected as corrupted, malformed names and
    /// unregistered platforms as schema failures, and signatures that cannot
    /// be recovered as mismatches. Other failures are errors, including
    /// image calls aborted by the inspector's deadline (see
    /// [`CertificateError::is_aborted`]).
    pub async fn verify_source(
        &self,
        source: &CertificateSource,
        expected_parent: Option<&str>,
    ) -> Result<Verdict, CertificateError> {
        match self.inspector.inspect(source).await {
            Ok(inspection) => Ok(self.verify(&inspection, expected_parent)),
            Err(e) if e.is_decode() => {
                warn!("Rejected undecodable certificate: {e}");
                Ok(Rejection::PayloadCorrupted(e.to_string()).into())
            }
            Err(e) if e.is_schema() => {
                warn!("Rejected certificate with invalid name: {e}");
                let reason = match e {
                    CertificateError::Name(e) => e.to_string(),
                    CertificateError::Platform(e) => e.to_string(),
                    other => other.to_string(),
                };
                Ok(Rejection::Schema(reason).into())
            }
            Err(CertificateError::Platform(e)) => {
                warn!("Rejected certificate with unrecoverable signature: {e}");
                Ok(Rejection::SignatureMismatch(e.to_string()).into())
            }
            Err(e) => Err(e),
        }
    }

    /// Verify an inspection record, optionally requiring it to be signed by
    /// `expected_parent`.
    pub fn verify(&self, inspection: &Inspection, expected_parent: Option<&str>) -> Verdict {
        let verdict = match self.check(inspection, expected_parent) {
            Ok(()) => Verdict::Verified,
            Err(rejection) => Verdict::Rejected(rejection),
        };
        match &verdict {
            Verdict::Verified => info!(
                "Verified {} issued by {}",
                inspection.certificate.subject.name, inspection.certificate.issuer.name
            ),
            Verdict::Rejected(rejection) => warn!(
                "Rejected {}: {}",
                inspection.certificate.subject.name, rejection
            ),
        }
        verdict
    }

    fn check(&self, inspection: &Inspection, expected_parent: Option<&str>) -> Result<(), Rejection> {
        let platforms = self.inspector.platforms();
        let certificate = &inspection.certificate;

        validate_certificate(certificate, platforms).map_err(|e| Rejection::Schema(e.to_string()))?;
        let subject = certificate
            .subject
            .name
            .parse::<PathPlatformId>()
            .map_err(|e| Rejection::Schema(e.to_string()))?;
        let issuer = certificate
            .issuer
            .name
            .parse::<PathPlatformId>()
            .map_err(|e| Rejection::Schema(e.to_string()))?;
        let platform = platforms
            .get(subject.platform_name())
            .map_err(|e| Rejection::Schema(e.to_string()))?;

        check_request_signers(inspection, platform.as_ref())?;

        if let Some(parent) = expected_parent {
            let issuer_platform = platforms
                .get(issuer.platform_name())
                .map_err(|e| Rejection::Schema(e.to_string()))?;
            if !issuer_platform.addresses_equal(&inspection.signature_address, parent, None) {
                return Err(Rejection::UnexpectedIssuer {
                    expected: parent.to_string(),
                    actual: inspection.signature_address.clone(),
                });
            }
        }

        check_image_hash(inspection)?;

        if certificate.kind == CertificateKind::Domain {
            if let Some(evidence) = &inspection.image {
                let mark = evidence
                    .signature_mark_address
                    .as_deref()
                    .ok_or(Rejection::MissingSignatureMark)?;
                let signer = inspection
                    .payload_signature_address
                    .as_deref()
                    .unwrap_or(&inspection.request_signature_address);
                if !platform.addresses_equal(signer, mark, None) {
                    return Err(Rejection::SignatureMarkMismatch {
                        expected: signer.to_string(),
                        actual: mark.to_string(),
                    });
                }
            }
        }

        match certificate.kind {
            CertificateKind::Ca => {
                if certificate.subject.name != certificate.issuer.name {
                    return Err(Rejection::NotSelfSigned(format!(
                        "issuer {} differs from subject {}",
                        certificate.issuer.name, certificate.subject.name
                    )));
                }
                if !platform.addresses_equal(
                    &certificate.request_address,
                    &inspection.signature_address,
                    certificate.request_nonce(),
                ) {
                    return Err(Rejection::NotSelfSigned(format!(
                        "signed by {}, request address is {}",
                        inspection.signature_address, certificate.request_address
                    )));
                }
            }
            CertificateKind::Domain | CertificateKind::Address | CertificateKind::Token => {
                let admissible = is_admissible_issuer(subject.path_name(), issuer.path_name())
                    .map_err(|e| Rejection::Schema(e.to_string()))?;
                if !admissible {
                    return Err(Rejection::InvalidIssuerPath {
                        issuer: certificate.issuer.name.clone(),
                        subject: certificate.subject.name.clone(),
                    });
                }
                if !platforms.is_compatible(subject.platform_name(), issuer.platform_name()) {
                    return Err(Rejection::IncompatiblePlatform {
                        issuer: issuer.platform_name().to_string(),
                        subject: subject.platform_name().to_string(),
                    });
                }
            }
        }

        debug!("All checks passed for {}", inspection.cache_key());
        Ok(())
    }
}

fn check_request_signers(inspection: &Inspection, platform: &dyn Platform) -> Result<(), Rejection> {
    let signers = RecoveredSigners {
        request: inspection.request_signature_address.clone(),
        for_signer: inspection.for_signature_address.clone(),
        payload: inspection.payload_signature_address.clone(),
    };
    check_signers(&inspection.certificate.request(), platform, &signers).map_err(|e| match e {
        CertificateError::RequestSignatureMismatch { expected, actual } => {
            Rejection::RequestSignatureMismatch { expected, actual }
        }
        CertificateError::ForSignatureMismatch { expected, actual } => {
            Rejection::ForSignatureMismatch { expected, actual }
        }
        CertificateError::PayloadSignatureMismatch { expected, actual } => {
            Rejection::PayloadSignatureMismatch { expected, actual }
        }
        other => Rejection::SignatureMismatch(other.to_string()),
    })
}

/// CA certificates carry a synthetic hash of their request; everything else
/// is compared against the bound image when the certificate came from one.
fn check_image_hash(inspection: &Inspection) -> Result<(), Rejection> {
    let certificate = &inspection.certificate;
    let actual = match (certificate.kind, &inspection.image) {
        (CertificateKind::Ca, _) => {
            synthetic_image_hash(&certificate.date_requested, &certificate.subject.name)
        }
        (_, Some(evidence)) => evidence.image_hash.clone(),
        (_, None) => return Ok(()),
    };
    if actual != certificate.image_hash {
        return Err(Rejection::ImageHashMismatch {
            expected: certificate.image_hash.clone(),
            actual,
        });
    }
    Ok(())
}
