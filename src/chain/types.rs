//! Types for certificate chain resolution.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::certificate::codec::CertificateEnvelope;
use crate::certificate::error::CertificateError;
use crate::certificate::types::{cache_key, Inspection};
use crate::certificate::verifier::Verdict;

/// A trusted root, used only as a starting point for chain walks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateAuthority {
    /// Subject name of the CA certificate, e.g. `@eth`.
    pub name: String,

    /// Address that signs certificates issued under this authority.
    pub root_address: String,

    /// Co-signing address of the CA certificate, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward: Option<String>,

    /// The CA certificate envelope as JSON.
    pub serialized_certificate: String,
}

impl CertificateAuthority {
    /// Storage key: `name;rootAddress`.
    pub fn key(&self) -> String {
        cache_key(&self.name, &self.root_address)
    }

    pub fn envelope(&self) -> Result<CertificateEnvelope, CertificateError> {
        CertificateEnvelope::from_json(&self.serialized_certificate)
    }
}

/// One verified hop of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub inspection: Inspection,
    pub status: Verdict,
}

/// Terminal state of a chain walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainStatus {
    /// A chain from a trusted root to the target was verified.
    Complete,
    /// Trusted roots exist for the platform but no chain reached the target.
    Incomplete,
    /// No registered root is compatible with the target platform.
    #[serde(rename = "CA Not Found")]
    CaNotFound,
    /// Cancelled or timed out before a verdict was reached.
    Aborted,
}

impl fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChainStatus::Complete => "Complete",
            ChainStatus::Incomplete => "Incomplete",
            ChainStatus::CaNotFound => "CA Not Found",
            ChainStatus::Aborted => "Aborted",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChainResult {
    pub status: ChainStatus,

    /// Root the chain starts from. For incomplete walks, the root of the
    /// longest partial chain found.
    pub authority: Option<CertificateAuthority>,

    /// Hops below the root, root-most first. Partial for incomplete walks.
    pub links: Vec<ChainLink>,
}

impl ChainResult {
    pub fn with_status(status: ChainStatus) -> Self {
        Self {
            status,
            authority: None,
            links: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == ChainStatus::Complete
    }
}
