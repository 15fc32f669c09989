//! Certificate signing requests, certificates and inspection records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::certificate::error::CertificateError;
use crate::modules::crypto::sha256_hex;
use crate::naming::{extract_path, NameError};

/// Subject or issuer identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Canonical `<pathName>@<platformName>`.
    pub name: String,
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
    /// ISO 3166 alpha-2.
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub city: String,
}

impl Identity {
    pub fn new(
        name: impl Into<String>,
        organization: impl Into<String>,
        country: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            organization: organization.into(),
            division: None,
            country: country.into(),
            province: None,
            state: None,
            city: city.into(),
        }
    }

    pub fn with_division(mut self, division: impl Into<String>) -> Self {
        self.division = Some(division.into());
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_province(mut self, province: impl Into<String>) -> Self {
        self.province = Some(province.into());
        self
    }

    /// `(pathName, platformName)` of this identity's name.
    pub fn path(&self) -> Result<(String, String), NameError> {
        extract_path(&self.name)
    }
}

/// Kind of certificate signing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    #[serde(rename = "CA Request")]
    Ca,
    #[serde(rename = "Domain Request")]
    Domain,
    #[serde(rename = "Address Request")]
    Address,
    #[serde(rename = "Token Request")]
    Token,
}

/// Kind of issued certificate; one per request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificateKind {
    #[serde(rename = "CA Certificate")]
    Ca,
    #[serde(rename = "Domain Certificate")]
    Domain,
    #[serde(rename = "Address Certificate")]
    Address,
    #[serde(rename = "Token Certificate")]
    Token,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Ca => "CA Request",
            RequestKind::Domain => "Domain Request",
            RequestKind::Address => "Address Request",
            RequestKind::Token => "Token Request",
        }
    }

    /// Every kind except CA is anchored to an image.
    pub fn requires_image(&self) -> bool {
        !matches!(self, RequestKind::Ca)
    }
}

impl CertificateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateKind::Ca => "CA Certificate",
            CertificateKind::Domain => "Domain Certificate",
            CertificateKind::Address => "Address Certificate",
            CertificateKind::Token => "Token Certificate",
        }
    }

    pub fn request_kind(&self) -> RequestKind {
        match self {
            CertificateKind::Ca => RequestKind::Ca,
            CertificateKind::Domain => RequestKind::Domain,
            CertificateKind::Address => RequestKind::Address,
            CertificateKind::Token => RequestKind::Token,
        }
    }
}

impl From<RequestKind> for CertificateKind {
    fn from(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Ca => CertificateKind::Ca,
            RequestKind::Domain => CertificateKind::Domain,
            RequestKind::Address => CertificateKind::Address,
            RequestKind::Token => CertificateKind::Token,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for CertificateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = CertificateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CA Request" | "ca" => Ok(RequestKind::Ca),
            "Domain Request" | "domain" => Ok(RequestKind::Domain),
            "Address Request" | "address" => Ok(RequestKind::Address),
            "Token Request" | "token" => Ok(RequestKind::Token),
            other => Err(CertificateError::UnknownKind(other.to_string())),
        }
    }
}

impl FromStr for CertificateKind {
    type Err = CertificateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CA Certificate" => Ok(CertificateKind::Ca),
            "Domain Certificate" => Ok(CertificateKind::Domain),
            "Address Certificate" => Ok(CertificateKind::Address),
            "Token Certificate" => Ok(CertificateKind::Token),
            other => Err(CertificateError::UnknownKind(other.to_string())),
        }
    }
}

/// Canonical signing payload of a request. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestPayload {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub subject: Identity,
    pub email: String,
    pub image_hash: String,
    pub date_requested: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_nonce: Option<u64>,
}

impl RequestPayload {
    /// Deterministic JSON encoding that every signature covers.
    pub fn canonical_json(&self) -> Result<String, CertificateError> {
        serde_json::to_string(self).map_err(|e| CertificateError::Encode(e.to_string()))
    }

    /// Message for the payload `signature`; domain requests prefix the
    /// embedded image code with a CRLF separator.
    pub fn signing_message(&self, code: Option<u64>) -> Result<String, CertificateError> {
        let payload = self.canonical_json()?;
        match (self.kind, code) {
            (RequestKind::Domain, Some(code)) => Ok(format!("{code}\r\n{payload}")),
            (RequestKind::Domain, None) => Err(CertificateError::MissingField("code")),
            _ => Ok(payload),
        }
    }

    /// Message for `requestSignature`: payload followed by the request address.
    pub fn request_message(&self, request_address: &str) -> Result<String, CertificateError> {
        Ok(format!("{}{}", self.canonical_json()?, request_address))
    }

    /// Message for `forSignature`: payload, request address, for address.
    pub fn for_message(
        &self,
        request_address: &str,
        for_address: &str,
    ) -> Result<String, CertificateError> {
        Ok(format!(
            "{}{}{}",
            self.canonical_json()?,
            request_address,
            for_address
        ))
    }
}

/// Synthetic image hash of a CA request: SHA-256 of the request date
/// followed by the subject name.
pub fn synthetic_image_hash(date_requested: &str, subject_name: &str) -> String {
    sha256_hex(format!("{date_requested}{subject_name}").as_bytes())
}

/// Canonical timestamp encoding for request and issue dates.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A signed certificate signing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequest {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub subject: Identity,
    pub email: String,
    pub image_hash: String,
    pub date_requested: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_nonce: Option<u64>,
    pub signature: String,
    pub request_address: String,
    pub request_signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_signature: Option<String>,
}

impl CertificateRequest {
    pub fn payload(&self) -> RequestPayload {
        RequestPayload {
            kind: self.kind,
            subject: self.subject.clone(),
            email: self.email.clone(),
            image_hash: self.image_hash.clone(),
            date_requested: self.date_requested.clone(),
            data: self.data.clone(),
            contract_nonce: self.contract_nonce,
        }
    }

    /// Nonce used when comparing the request address, present only for
    /// contract-derived request addresses (no co-signer).
    pub fn request_nonce(&self) -> Option<u64> {
        if self.for_address.is_some() {
            None
        } else {
            self.contract_nonce
        }
    }
}

/// An issued certificate, as serialized and compressed inside an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CertificateKind,
    pub subject: Identity,
    pub email: String,
    pub image_hash: String,
    pub date_requested: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_nonce: Option<u64>,
    pub signature: String,
    pub request_address: String,
    pub request_signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_signature: Option<String>,
    pub issuer: Identity,
    pub issuer_email: String,
    pub date_issued: String,
    pub serial_number: String,
}

impl Certificate {
    /// The request this certificate was issued from.
    pub fn request(&self) -> CertificateRequest {
        CertificateRequest {
            kind: self.kind.request_kind(),
            subject: self.subject.clone(),
            email: self.email.clone(),
            image_hash: self.image_hash.clone(),
            date_requested: self.date_requested.clone(),
            data: self.data.clone(),
            contract_nonce: self.contract_nonce,
            signature: self.signature.clone(),
            request_address: self.request_address.clone(),
            request_signature: self.request_signature.clone(),
            for_address: self.for_address.clone(),
            for_signature: self.for_signature.clone(),
        }
    }

    pub fn payload(&self) -> RequestPayload {
        self.request().payload()
    }

    pub fn request_nonce(&self) -> Option<u64> {
        if self.for_address.is_some() {
            None
        } else {
            self.contract_nonce
        }
    }

    /// Addresses this certificate is issued to.
    pub fn holder_addresses(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.request_address.as_str()).chain(self.for_address.as_deref())
    }
}

/// Evidence recovered from the image a certificate is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageEvidence {
    /// Recomputed content hash of the image.
    pub image_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_mark_address: Option<String>,
}

/// A decoded certificate together with every signer address recovered from
/// it. Derived fields are untrusted until the verifier checks them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    pub certificate: Certificate,
    /// Issuer signature over the compressed certificate bytes.
    pub signature: String,
    /// Issuer address recovered from `signature`.
    pub signature_address: String,
    /// Signer of the request payload signature, when the message could be
    /// reconstructed (domain certificates need the image code).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_signature_address: Option<String>,
    pub request_signature_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_signature_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageEvidence>,
}

impl Inspection {
    /// Cache key: `name;signatureAddress`.
    pub fn cache_key(&self) -> String {
        cache_key(&self.certificate.subject.name, &self.signature_address)
    }

    /// Key-derived address that signs certificates issued under this one.
    /// Equals the request address unless that address is contract-derived.
    pub fn authority_address(&self) -> &str {
        &self.request_signature_address
    }
}

/// `name;signatureAddress`, lowercased address so lookups are case-insensitive.
pub fn cache_key(name: &str, signature_address: &str) -> String {
    format!("{};{}", name, signature_address.to_lowercase())
}
