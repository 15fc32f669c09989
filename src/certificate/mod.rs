//! The certificate protocol: signed requests, issuance, inspection and
//! verification.
//!
//! ```text
//! RequestBuilder ──▶ CertificateRequest ──▶ Issuer ──▶ CertificateEnvelope
//!                                                            │
//!                          Verdict ◀── Verifier ◀── Inspection ◀── Inspector
//! ```

pub mod codec;
pub mod error;
pub mod inspector;
pub mod issuer;
pub mod request;
pub mod schema;
pub mod types;
pub mod verifier;

pub use codec::{CertificateEnvelope, COMPRESSED_FORMAT};
pub use error::CertificateError;
pub use inspector::{embed_certificate, CertificateSource, Inspector};
pub use issuer::{certificate_id, Issuer};
pub use request::{sign_mark, RequestBuilder};
pub use types::{
    Certificate, CertificateKind, CertificateRequest, Identity, ImageEvidence, Inspection,
    RequestKind, RequestPayload,
};
pub use verifier::{Rejection, Verdict, Verifier};
