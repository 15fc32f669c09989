//! Certificate signing request construction.
//!
//! # Example
//! ```ignore
//! let request = RequestBuilder::new(RequestKind::Domain)
//!     .subject(Identity::new("name.tld@eth", "Example", "US", "Austin"))
//!     .email("admin@name.tld")
//!     .image("logo.png")
//!     .build(&platforms, &images, &owner_key, None)
//!     .await?;
//! ```

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::certificate::error::CertificateError;
use crate::certificate::schema::{validate_email, validate_identity, validate_subject_kind};
use crate::certificate::types::{
    format_timestamp, synthetic_image_hash, CertificateRequest, Identity, RequestKind,
    RequestPayload,
};
use crate::modules::image::{mark_message, ImageBinding, ImageDeadline};
use crate::modules::platform::{Platform, PlatformError, PlatformRegistry};
use crate::modules::secure_keys::PrivateKey;

/// Builder for signed certificate signing requests.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    kind: RequestKind,
    subject: Option<Identity>,
    email: Option<String>,
    image: Option<PathBuf>,
    code: Option<u64>,
    contract_nonce: Option<u64>,
    data: Option<String>,
    requested_at: Option<DateTime<Utc>>,
    deadline: ImageDeadline,
}

impl RequestBuilder {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            subject: None,
            email: None,
            image: None,
            code: None,
            contract_nonce: None,
            data: None,
            requested_at: None,
            deadline: ImageDeadline::default(),
        }
    }

    pub fn subject(mut self, subject: Identity) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Image the certificate is bound to. Required for every kind but CA.
    pub fn image(mut self, image: impl Into<PathBuf>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Numeric code prefixed to domain payload signatures. Read from the
    /// image when not given.
    pub fn code(mut self, code: u64) -> Self {
        self.code = Some(code);
        self
    }

    /// Deployment nonce of the contract the request address refers to.
    pub fn contract_nonce(mut self, nonce: u64) -> Self {
        self.contract_nonce = Some(nonce);
        self
    }

    pub fn data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Fix the request timestamp instead of using the current time.
    pub fn requested_at(mut self, at: DateTime<Utc>) -> Self {
        self.requested_at = Some(at);
        self
    }

    /// Bound image reads by a timeout and cancellation token.
    pub fn image_deadline(mut self, deadline: ImageDeadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// Validate the inputs and produce a request signed by `key`, co-signed
    /// by `for_key` when given.
    pub async fn build(
        self,
        platforms: &PlatformRegistry,
        images: &dyn ImageBinding,
        key: &PrivateKey,
        for_key: Option<&PrivateKey>,
    ) -> Result<CertificateRequest, CertificateError> {
        let subject = self.subject.ok_or(CertificateError::MissingField("subject"))?;
        let email = self.email.ok_or(CertificateError::MissingField("email"))?;
        let (subject_id, platform) = validate_identity("subject", &subject, platforms)?;
        validate_subject_kind(self.kind, &subject_id)?;
        validate_email("email", &email)?;
        if let Some(data) = &self.data {
            if data.trim().is_empty() {
                return Err(CertificateError::invalid("data", "must not be empty"));
            }
        }

        let image = match (self.kind.requires_image(), self.image) {
            (true, None) => return Err(CertificateError::MissingField("image")),
            (true, Some(image)) => Some(image),
            (false, _) => None,
        };

        let date_requested = format_timestamp(self.requested_at.unwrap_or_else(Utc::now));
        let image_hash = match &image {
            Some(path) => self.deadline.run("image hash", images.image_hash(path)).await?,
            None => synthetic_image_hash(&date_requested, &subject.name),
        };

        let code = match (self.kind, self.code, &image) {
            (RequestKind::Domain, Some(code), _) => Some(code),
            (RequestKind::Domain, None, Some(path)) => Some(
                self.deadline
                    .run("image code", images.extract_code(path))
                    .await?,
            ),
            _ => None,
        };

        let payload = RequestPayload {
            kind: self.kind,
            subject,
            email,
            image_hash,
            date_requested,
            data: self.data,
            contract_nonce: self.contract_nonce,
        };

        let request_nonce = if for_key.is_some() {
            None
        } else {
            self.contract_nonce
        };
        let request_address = platform.address(key, request_nonce)?;
        debug!(
            "Signing {} for {} as {}",
            payload.kind, payload.subject.name, request_address
        );

        let signature = platform.sign(key, payload.signing_message(code)?.as_bytes())?;
        let request_signature =
            platform.sign(key, payload.request_message(&request_address)?.as_bytes())?;

        let (for_address, for_signature) = match for_key {
            Some(for_key) => {
                let for_address = platform.address(for_key, self.contract_nonce)?;
                let for_signature = platform.sign(
                    for_key,
                    payload
                        .for_message(&request_address, &for_address)?
                        .as_bytes(),
                )?;
                (Some(for_address), Some(for_signature))
            }
            None => (None, None),
        };

        info!(
            "Built {} for {} (request address {})",
            payload.kind, payload.subject.name, request_address
        );

        Ok(CertificateRequest {
            kind: payload.kind,
            subject: payload.subject,
            email: payload.email,
            image_hash: payload.image_hash,
            date_requested: payload.date_requested,
            data: payload.data,
            contract_nonce: payload.contract_nonce,
            signature,
            request_address,
            request_signature,
            for_address,
            for_signature,
        })
    }
}

/// Signature mark a subject paints into its bound image.
pub fn sign_mark(
    platform: &dyn Platform,
    key: &PrivateKey,
    code: u64,
    subject_name: &str,
) -> Result<String, PlatformError> {
    platform.sign(key, mark_message(code, subject_name).as_bytes())
}
