//! Certificate inspection: decode a certificate from wherever it lives and
//! recover every signer address it carries.
//!
//! Nothing recovered here is trusted. The verifier decides whether the
//! recovered addresses match what the certificate claims.

use std::path::{Path, PathBuf};

use log::debug;

use crate::certificate::codec::{encode_certificate, issuer_message, CertificateEnvelope};
use crate::certificate::error::CertificateError;
use crate::certificate::issuer::recover_signers;
use crate::certificate::types::{Certificate, CertificateKind, ImageEvidence, Inspection};
use crate::modules::image::{mark_message, ImageBinding, ImageDeadline, ImageError, MarkGeometry};
use crate::modules::platform::PlatformRegistry;
use crate::naming::PathPlatformId;

/// Where a certificate is read from.
#[derive(Debug, Clone)]
pub enum CertificateSource {
    /// JSON envelope file.
    File(PathBuf),
    /// Image carrying an embedded envelope.
    Image(PathBuf),
    Envelope(CertificateEnvelope),
    /// Uncompressed certificate passed by reference, with its issuer signature.
    Structure {
        certificate: Certificate,
        signature: String,
    },
}

pub struct Inspector<'a> {
    platforms: &'a PlatformRegistry,
    images: &'a dyn ImageBinding,
    mark_geometry: MarkGeometry,
    deadline: ImageDeadline,
}

impl<'a> Inspector<'a> {
    pub fn new(platforms: &'a PlatformRegistry, images: &'a dyn ImageBinding) -> Self {
        Self {
            platforms,
            images,
            mark_geometry: MarkGeometry::default(),
            deadline: ImageDeadline::default(),
        }
    }

    /// Bound every image adapter call. Aborted calls surface as
    /// `ImageError::Aborted`.
    pub fn with_image_deadline(mut self, deadline: ImageDeadline) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_mark_geometry(mut self, geometry: MarkGeometry) -> Self {
        self.mark_geometry = geometry;
        self
    }

    pub fn platforms(&self) -> &'a PlatformRegistry {
        self.platforms
    }

    pub async fn inspect(&self, source: &CertificateSource) -> Result<Inspection, CertificateError> {
        match source {
            CertificateSource::File(path) => {
                let envelope = CertificateEnvelope::read_file(path).await?;
                self.inspect_envelope(&envelope, None).await
            }
            CertificateSource::Image(path) => {
                let envelope = self.read_image_envelope(path).await?;
                self.inspect_envelope(&envelope, Some(path)).await
            }
            CertificateSource::Envelope(envelope) => self.inspect_envelope(envelope, None).await,
            CertificateSource::Structure {
                certificate,
                signature,
            } => {
                let compressed = encode_certificate(certificate)?;
                self.inspect_decoded(certificate.clone(), &compressed, signature, None)
                    .await
            }
        }
    }

    async fn inspect_envelope(
        &self,
        envelope: &CertificateEnvelope,
        image: Option<&Path>,
    ) -> Result<Inspection, CertificateError> {
        let (certificate, compressed) = envelope.open()?;
        self.inspect_decoded(certificate, &compressed, &envelope.signature, image)
            .await
    }

    async fn inspect_decoded(
        &self,
        certificate: Certificate,
        compressed: &[u8],
        signature: &str,
        image: Option<&Path>,
    ) -> Result<Inspection, CertificateError> {
        let issuer_id: PathPlatformId = certificate.issuer.name.parse()?;
        let issuer_platform = self.platforms.get(issuer_id.platform_name())?;
        let signature_address =
            issuer_platform.recover(signature, issuer_message(compressed).as_bytes(), None)?;

        let subject_id: PathPlatformId = certificate.subject.name.parse()?;
        let platform = self.platforms.get(subject_id.platform_name())?;

        let mut evidence = match image {
            Some(path) => Some(ImageEvidence {
                image_hash: self
                    .deadline
                    .run("image hash", self.images.image_hash(path))
                    .await?,
                code: None,
                signature_mark_address: None,
            }),
            None => None,
        };

        // A missing code or mark is left as `None` for the verifier to reject.
        if let (Some(path), Some(evidence), CertificateKind::Domain) =
            (image, evidence.as_mut(), certificate.kind)
        {
            evidence.code = absent_as_none(
                self.deadline
                    .run("image code", self.images.extract_code(path))
                    .await,
            )?;
            let mark = absent_as_none(
                self.deadline
                    .run(
                        "signature mark",
                        self.images.extract_mark(path, self.mark_geometry),
                    )
                    .await,
            )?;
            if let (Some(code), Some(mark)) = (evidence.code, mark) {
                evidence.signature_mark_address = Some(platform.recover(
                    &mark,
                    mark_message(code, &certificate.subject.name).as_bytes(),
                    None,
                )?);
            }
        }

        let code = evidence.as_ref().and_then(|evidence| evidence.code);
        let signers = recover_signers(&certificate.request(), platform.as_ref(), code)?;

        debug!(
            "Inspected {} issued by {} (signer {})",
            certificate.subject.name, certificate.issuer.name, signature_address
        );

        Ok(Inspection {
            certificate,
            signature: signature.to_string(),
            signature_address,
            payload_signature_address: signers.payload,
            request_signature_address: signers.request,
            for_signature_address: signers.for_signer,
            image: evidence,
        })
    }

    async fn read_image_envelope(&self, path: &Path) -> Result<CertificateEnvelope, CertificateError> {
        let payload = self
            .deadline
            .run("certificate extraction", self.images.extract(path))
            .await?
            .ok_or(ImageError::Missing("certificate"))?;
        CertificateEnvelope::from_json(&payload)
    }
}

fn absent_as_none<T>(result: Result<T, ImageError>) -> Result<Option<T>, ImageError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ImageError::Missing(what)) => {
            debug!("Image has no {}", what);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Write a copy of `image` carrying `envelope` to `output`.
pub async fn embed_certificate(
    images: &dyn ImageBinding,
    envelope: &CertificateEnvelope,
    image: &Path,
    output: &Path,
) -> Result<(), CertificateError> {
    images.embed(image, &envelope.to_json()?, output).await?;
    Ok(())
}
