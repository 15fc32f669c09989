//! Address certificates: a public-key infrastructure for ledger addresses.
//!
//! Certificates bind a hierarchical `<path>@<platform>` name to a ledger
//! address, optionally anchored to an image. This crate builds and signs
//! requests, issues certificates, inspects and verifies them, and resolves
//! chains from a trusted root down to a target holder.
//!
//! ```ignore
//! use addrcert::certificate::{CertificateSource, Inspector, Verifier};
//! use addrcert::modules::platform::PlatformRegistry;
//!
//! let platforms = PlatformRegistry::with_defaults();
//! let verifier = Verifier::new(Inspector::new(&platforms, &images));
//! let verdict = verifier
//!     .verify_source(&CertificateSource::Image("logo.png".into()), None)
//!     .await?;
//! println!("{verdict}");
//! ```

// Certificate requests, issuance, inspection and verification
pub mod certificate;

// Chain resolution from trusted roots
pub mod chain;

// Platform, image, storage and configuration adapters
pub mod modules;

// Names and ancestor paths
pub mod naming;

pub use certificate::{
    Certificate, CertificateEnvelope, CertificateError, CertificateRequest, CertificateSource,
    Identity, Inspection, Inspector, Issuer, Rejection, RequestBuilder, RequestKind, Verdict,
    Verifier,
};
pub use chain::{CaRegistry, ChainResult, ChainStatus, ChainWalker};
pub use naming::{calculate_chain_paths, extract_path, PathPlatformId};
