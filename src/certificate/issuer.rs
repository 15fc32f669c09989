//! Certificate issuance.
//!
//! The issuer re-checks every signature in the request, makes sure it is
//! allowed to sign for the subject, then wraps the request in a certificate
//! and signs the compressed canonical bytes.

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::certificate::codec::CertificateEnvelope;
use crate::certificate::error::CertificateError;
use crate::certificate::schema::{validate_email, validate_identity, validate_request};
use crate::certificate::types::{
    format_timestamp, Certificate, CertificateKind, CertificateRequest, Identity, RequestKind,
};
use crate::modules::crypto::{random_serial_number, sha256_hex};
use crate::modules::platform::{Platform, PlatformRegistry};
use crate::modules::secure_keys::PrivateKey;
use crate::naming::{is_admissible_issuer, PathPlatformId, TOKEN_SEPARATOR};

/// Request signers, recovered without any nonce applied.
pub(crate) struct RecoveredSigners {
    pub request: String,
    pub for_signer: Option<String>,
    /// `None` when the payload message cannot be rebuilt (domain requests
    /// without their image code).
    pub payload: Option<String>,
}

pub(crate) fn recover_signers(
    request: &CertificateRequest,
    platform: &dyn Platform,
    code: Option<u64>,
) -> Result<RecoveredSigners, CertificateError> {
    let payload = request.payload();

    let request_signer = platform.recover(
        &request.request_signature,
        payload.request_message(&request.request_address)?.as_bytes(),
        None,
    )?;

    let for_signer = match (&request.for_address, &request.for_signature) {
        (Some(for_address), Some(for_signature)) => Some(platform.recover(
            for_signature,
            payload
                .for_message(&request.request_address, for_address)?
                .as_bytes(),
            None,
        )?),
        _ => None,
    };

    let payload_signer = match (request.kind, code) {
        (RequestKind::Domain, None) => None,
        _ => Some(platform.recover(
            &request.signature,
            payload.signing_message(code)?.as_bytes(),
            None,
        )?),
    };

    Ok(RecoveredSigners {
        request: request_signer,
        for_signer,
        payload: payload_signer,
    })
}

/// Check recovered signers against the addresses the request claims.
///
/// The request address may be contract-derived from its signer; the for
/// address is always derived with the contract nonce when one is present.
pub(crate) fn check_signers(
    request: &CertificateRequest,
    platform: &dyn Platform,
    signers: &RecoveredSigners,
) -> Result<(), CertificateError> {
    if !platform.addresses_equal(
        &request.request_address,
        &signers.request,
        request.request_nonce(),
    ) {
        return Err(CertificateError::RequestSignatureMismatch {
            expected: request.request_address.clone(),
            actual: signers.request.clone(),
        });
    }

    if let Some(for_address) = &request.for_address {
        let actual = signers.for_signer.clone().unwrap_or_default();
        if !platform.addresses_equal(for_address, &actual, request.contract_nonce) {
            return Err(CertificateError::ForSignatureMismatch {
                expected: for_address.clone(),
                actual,
            });
        }
    }

    if let Some(payload_signer) = &signers.payload {
        if !platform.addresses_equal(&signers.request, payload_signer, None) {
            return Err(CertificateError::PayloadSignatureMismatch {
                expected: signers.request.clone(),
                actual: payload_signer.clone(),
            });
        }
    }
    Ok(())
}

/// Certificate id for a request.
///
/// Token certificates are named by their own path. Everything else is
/// scoped to a token (or the request address when no token is given):
/// `#0` for the platform root, `#<sha256(path)>` below it.
pub fn certificate_id(
    kind: RequestKind,
    subject: &PathPlatformId,
    request_address: &str,
    token_id: Option<&str>,
) -> String {
    if kind == RequestKind::Token {
        return subject.path_name().to_string();
    }
    let scope = token_id.unwrap_or(request_address);
    if subject.is_root() {
        format!("{scope}{TOKEN_SEPARATOR}0")
    } else {
        format!(
            "{scope}{TOKEN_SEPARATOR}{}",
            sha256_hex(subject.path_name().as_bytes())
        )
    }
}

/// An issuing authority: its identity, contact email and signing key.
pub struct Issuer<'a> {
    platforms: &'a PlatformRegistry,
    identity: Identity,
    email: String,
    key: &'a PrivateKey,
    issued_at: Option<DateTime<Utc>>,
}

impl<'a> Issuer<'a> {
    pub fn new(
        platforms: &'a PlatformRegistry,
        identity: Identity,
        email: impl Into<String>,
        key: &'a PrivateKey,
    ) -> Self {
        Self {
            platforms,
            identity,
            email: email.into(),
            key,
            issued_at: None,
        }
    }

    /// Fix the issue timestamp instead of using the current time.
    pub fn issued_at(mut self, at: DateTime<Utc>) -> Self {
        self.issued_at = Some(at);
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Check `request` and issue a signed certificate envelope for it.
    ///
    /// Domain requests must name the token the certificate is scoped to.
    pub fn issue(
        &self,
        request: &CertificateRequest,
        token_id: Option<&str>,
    ) -> Result<CertificateEnvelope, CertificateError> {
        let (subject, platform) = validate_request(request, self.platforms)?;
        let (issuer, issuer_platform) = validate_identity("issuer", &self.identity, self.platforms)?;
        validate_email("issuerEmail", &self.email)?;

        let signers = recover_signers(request, platform.as_ref(), None)?;
        check_signers(request, platform.as_ref(), &signers)?;

        match request.kind {
            RequestKind::Ca => {
                if self.identity.name != request.subject.name {
                    return Err(CertificateError::NotSelfSigned(format!(
                        "issuer {} differs from subject {}",
                        self.identity.name, request.subject.name
                    )));
                }
                let issuer_address = issuer_platform.address(self.key, None)?;
                if !platform.addresses_equal(
                    &request.request_address,
                    &issuer_address,
                    request.request_nonce(),
                ) {
                    return Err(CertificateError::NotSelfSigned(format!(
                        "issuer key {} does not control request address {}",
                        issuer_address, request.request_address
                    )));
                }
            }
            RequestKind::Domain | RequestKind::Address | RequestKind::Token => {
                if !is_admissible_issuer(subject.path_name(), issuer.path_name())? {
                    return Err(CertificateError::InvalidIssuerPath {
                        issuer: self.identity.name.clone(),
                        subject: request.subject.name.clone(),
                    });
                }
                if !self
                    .platforms
                    .is_compatible(subject.platform_name(), issuer.platform_name())
                {
                    return Err(CertificateError::IncompatiblePlatform {
                        issuer: issuer.platform_name().to_string(),
                        subject: subject.platform_name().to_string(),
                    });
                }
            }
        }

        if request.kind == RequestKind::Domain && token_id.is_none() {
            return Err(CertificateError::MissingField("tokenId"));
        }

        let id = certificate_id(request.kind, &subject, &request.request_address, token_id);
        debug!("Issuing {} as {}", request.subject.name, id);

        let certificate = Certificate {
            id,
            kind: CertificateKind::from(request.kind),
            subject: request.subject.clone(),
            email: request.email.clone(),
            image_hash: request.image_hash.clone(),
            date_requested: request.date_requested.clone(),
            data: request.data.clone(),
            contract_nonce: request.contract_nonce,
            signature: request.signature.clone(),
            request_address: request.request_address.clone(),
            request_signature: request.request_signature.clone(),
            for_address: request.for_address.clone(),
            for_signature: request.for_signature.clone(),
            issuer: self.identity.clone(),
            issuer_email: self.email.clone(),
            date_issued: format_timestamp(self.issued_at.unwrap_or_else(Utc::now)),
            serial_number: random_serial_number(),
        };

        let envelope = CertificateEnvelope::seal(&certificate, issuer_platform.as_ref(), self.key)?;
        info!(
            "Issued {} for {} by {} (serial {})",
            certificate.kind, certificate.subject.name, certificate.issuer.name, certificate.serial_number
        );
        Ok(envelope)
    }
}
