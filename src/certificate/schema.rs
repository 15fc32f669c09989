//! Structural validation of requests and certificates.
//!
//! Errors name the offending field path (`subject.country`,
//! `issuer.name`, ...). Cryptographic consistency is checked elsewhere.

use std::sync::Arc;

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::certificate::error::CertificateError;
use crate::certificate::types::{Certificate, CertificateRequest, Identity, RequestKind};
use crate::modules::platform::{Platform, PlatformRegistry};
use crate::naming::PathPlatformId;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());
static COUNTRY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{2}$").unwrap());
static HASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{64}$").unwrap());
static SERIAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{32}$").unwrap());
static PLATFORM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(:[a-z0-9-]+)?$").unwrap());

fn require_text(field: &str, value: &str) -> Result<(), CertificateError> {
    if value.trim().is_empty() {
        return Err(CertificateError::invalid(field, "must not be empty"));
    }
    Ok(())
}

fn optional_text(field: &str, value: &Option<String>) -> Result<(), CertificateError> {
    match value {
        Some(value) => require_text(field, value),
        None => Ok(()),
    }
}

/// Validate an identity and return its parsed name and platform adapter.
pub fn validate_identity<'a>(
    field: &str,
    identity: &Identity,
    platforms: &'a PlatformRegistry,
) -> Result<(PathPlatformId, &'a Arc<dyn Platform>), CertificateError> {
    let name_field = format!("{field}.name");
    let id = identity
        .name
        .parse::<PathPlatformId>()
        .map_err(|e| CertificateError::invalid(&name_field, e.to_string()))?;

    if !PLATFORM_RE.is_match(id.platform_name()) {
        return Err(CertificateError::invalid(
            &name_field,
            format!("malformed platform '{}'", id.platform_name()),
        ));
    }
    let platform = platforms.get(id.platform_name()).map_err(|_| {
        CertificateError::invalid(
            &name_field,
            format!("unregistered platform '{}'", id.platform_name()),
        )
    })?;
    if !platform.is_valid_path(id.path_name()) {
        return Err(CertificateError::invalid(
            &name_field,
            format!("path '{}' is not valid on {}", id.path_name(), platform.name()),
        ));
    }

    require_text(&format!("{field}.organization"), &identity.organization)?;
    require_text(&format!("{field}.city"), &identity.city)?;
    if !COUNTRY_RE.is_match(&identity.country) {
        return Err(CertificateError::invalid(
            format!("{field}.country"),
            "must be a two-letter upper-case country code",
        ));
    }
    optional_text(&format!("{field}.division"), &identity.division)?;
    optional_text(&format!("{field}.province"), &identity.province)?;
    optional_text(&format!("{field}.state"), &identity.state)?;

    Ok((id, platform))
}

pub fn validate_email(field: &str, email: &str) -> Result<(), CertificateError> {
    if !EMAIL_RE.is_match(email) {
        return Err(CertificateError::invalid(field, "must be an email address"));
    }
    Ok(())
}

fn validate_timestamp(field: &str, value: &str) -> Result<(), CertificateError> {
    DateTime::parse_from_rfc3339(value)
        .map(|_| ())
        .map_err(|e| CertificateError::invalid(field, e.to_string()))
}

/// Kind-specific subject path rules.
pub fn validate_subject_kind(kind: RequestKind, subject: &PathPlatformId) -> Result<(), CertificateError> {
    let ok = match kind {
        RequestKind::Ca => subject.is_root(),
        RequestKind::Token => subject.is_token_reference(),
        RequestKind::Domain | RequestKind::Address => {
            !subject.is_root() && !subject.is_token_reference()
        }
    };
    if ok {
        return Ok(());
    }
    let reason = match kind {
        RequestKind::Ca => "CA subjects must be a platform root (@<platform>)",
        RequestKind::Token => "token subjects must be <address>#<tokenId>",
        RequestKind::Domain | RequestKind::Address => "must name a path below the platform root",
    };
    Err(CertificateError::invalid("subject.name", reason))
}

/// Validate the shape of a signed request.
pub fn validate_request<'a>(
    request: &CertificateRequest,
    platforms: &'a PlatformRegistry,
) -> Result<(PathPlatformId, &'a Arc<dyn Platform>), CertificateError> {
    let (subject, platform) = validate_identity("subject", &request.subject, platforms)?;
    validate_subject_kind(request.kind, &subject)?;
    validate_email("email", &request.email)?;
    if !HASH_RE.is_match(&request.image_hash) {
        return Err(CertificateError::invalid(
            "imageHash",
            "must be 64 lower-case hex characters",
        ));
    }
    validate_timestamp("dateRequested", &request.date_requested)?;
    optional_text("data", &request.data)?;

    if !platform.is_valid_signature(&request.signature) {
        return Err(CertificateError::invalid("signature", "malformed signature"));
    }
    if !platform.is_valid_address(&request.request_address) {
        return Err(CertificateError::invalid("requestAddress", "malformed address"));
    }
    if !platform.is_valid_signature(&request.request_signature) {
        return Err(CertificateError::invalid("requestSignature", "malformed signature"));
    }

    match (&request.for_address, &request.for_signature) {
        (None, None) => {}
        (Some(address), Some(signature)) => {
            if !platform.is_valid_address(address) {
                return Err(CertificateError::invalid("forAddress", "malformed address"));
            }
            if !platform.is_valid_signature(signature) {
                return Err(CertificateError::invalid("forSignature", "malformed signature"));
            }
        }
        (Some(_), None) => return Err(CertificateError::MissingField("forSignature")),
        (None, Some(_)) => return Err(CertificateError::MissingField("forAddress")),
    }

    Ok((subject, platform))
}

/// Validate the shape of an issued certificate.
pub fn validate_certificate(
    certificate: &Certificate,
    platforms: &PlatformRegistry,
) -> Result<(), CertificateError> {
    require_text("id", &certificate.id)?;
    validate_request(&certificate.request(), platforms)?;
    validate_identity("issuer", &certificate.issuer, platforms)?;
    validate_email("issuerEmail", &certificate.issuer_email)?;
    validate_timestamp("dateIssued", &certificate.date_issued)?;
    if !SERIAL_RE.is_match(&certificate.serial_number) {
        return Err(CertificateError::invalid(
            "serialNumber",
            "must be 32 lower-case hex characters",
        ));
    }
    Ok(())
}
