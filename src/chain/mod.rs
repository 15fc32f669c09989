//! Certificate chain resolution.
//!
//! Walks from a trusted certificate authority down the ancestor paths of a
//! target name, verifying every hop against the address that signed it.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐     ┌──────────────────┐     ┌────────────────┐
//! │ CaRegistry │────▶│   ChainWalker    │◀────│ InspectionCache│
//! │  (seeds)   │     │ (depth-first)    │     │  (moka + TTL)  │
//! └────────────┘     └──────────────────┘     └────────────────┘
//!                       │            │
//!                       ▼            ▼
//!          ┌───────────────────┐  ┌──────────┐
//!          │ CertificateLookup │  │ Verifier │
//!          │     (trait)       │  └──────────┘
//!          └───────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let registry = CaRegistry::new(storage.clone());
//! registry.add(&verifier, &ca_envelope).await?;
//!
//! let lookup = StoredLookup::new(storage.clone());
//! let cache = InspectionCache::from_settings(&settings).with_storage(storage);
//! let walker = ChainWalker::new(&verifier, &registry, &lookup)
//!     .with_settings(&settings)
//!     .with_cache(&cache);
//!
//! let result = walker.walk("name.tld@eth", &holder, &CancellationToken::new()).await?;
//! match result.status {
//!     ChainStatus::Complete => { /* trusted */ }
//!     status => { /* Incomplete, CA Not Found or Aborted */ }
//! }
//! ```

pub mod cache;
pub mod client;
pub mod error;
pub mod registry;
pub mod types;
pub mod walker;

pub use cache::InspectionCache;
pub use client::{CertificateLookup, StoredLookup};
pub use error::{CacheError, ChainError};
pub use registry::CaRegistry;
pub use types::{CertificateAuthority, ChainLink, ChainResult, ChainStatus};
pub use walker::ChainWalker;
