//! Chain resolution from a trusted root to a target address.
//!
//! The target's ancestor paths, root-most first, are walked from each
//! registered authority in turn:
//!
//! ```text
//! name.tld@eth  ->  ["*", "*.tld", "name.tld"]
//!
//! @eth (root) ──▶ *.tld@eth ──▶ name.tld@eth
//!   "*" absent, skipped
//! ```
//!
//! At every hop the walker looks up the certificate for the next path signed
//! by the current address and verifies it with that address as the expected
//! parent. Missing levels are skipped and failed branches are backtracked.
//! Each hop moves strictly forward in the path list, so a walk always
//! terminates. Authorities are tried one at a time.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::certificate::inspector::CertificateSource;
use crate::certificate::types::Inspection;
use crate::certificate::verifier::{Verdict, Verifier};
use crate::chain::cache::InspectionCache;
use crate::chain::client::CertificateLookup;
use crate::chain::error::ChainError;
use crate::chain::registry::CaRegistry;
use crate::chain::types::{CertificateAuthority, ChainLink, ChainResult, ChainStatus};
use crate::modules::config::Settings;
use crate::modules::platform::Platform;
use crate::naming::PathPlatformId;

const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a walk stopped before reaching a verdict.
enum Interrupt {
    Cancelled,
    TimedOut,
    Failed(ChainError),
}

impl From<ChainError> for Interrupt {
    fn from(e: ChainError) -> Self {
        Interrupt::Failed(e)
    }
}

/// One level of the depth-first search: the address certificates must be
/// signed by, and the next path index to try from it.
struct Frame {
    address: String,
    next: usize,
}

pub struct ChainWalker<'a> {
    verifier: &'a Verifier<'a>,
    registry: &'a CaRegistry,
    lookup: &'a dyn CertificateLookup,
    cache: Option<&'a InspectionCache>,
    lookup_timeout: Duration,
    settings: Option<&'a Settings>,
}

impl<'a> ChainWalker<'a> {
    pub fn new(
        verifier: &'a Verifier<'a>,
        registry: &'a CaRegistry,
        lookup: &'a dyn CertificateLookup,
    ) -> Self {
        Self {
            verifier,
            registry,
            lookup,
            cache: None,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            settings: None,
        }
    }

    /// Take the lookup timeout and timing-log switch from `settings`.
    pub fn with_settings(mut self, settings: &'a Settings) -> Self {
        self.lookup_timeout = settings.lookup_timeout;
        self.settings = Some(settings);
        self
    }

    pub fn with_cache(mut self, cache: &'a InspectionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Resolve a chain from a trusted root to the certificate for `target`
    /// held by `target_address`.
    ///
    /// Cancellation or a lookup timeout yields `ChainStatus::Aborted`.
    /// Storage and lookup failures are errors.
    pub async fn walk(
        &self,
        target: &str,
        target_address: &str,
        cancel: &CancellationToken,
    ) -> Result<ChainResult, ChainError> {
        let started = Instant::now();
        let result = self.walk_inner(target, target_address, cancel).await;
        if let Some(settings) = self.settings {
            settings.log_timing(&format!("Chain walk for {target}"), started.elapsed());
        }
        result
    }

    async fn walk_inner(
        &self,
        target: &str,
        target_address: &str,
        cancel: &CancellationToken,
    ) -> Result<ChainResult, ChainError> {
        let target_id: PathPlatformId = target.parse()?;
        let platforms = self.verifier.inspector().platforms();
        let platform = platforms.get(target_id.platform_name())?;

        let candidates = self
            .registry
            .candidates_for(target_id.platform_name(), platforms)
            .await?;
        if candidates.is_empty() {
            warn!("No certificate authority for {}", target);
            return Ok(ChainResult::with_status(ChainStatus::CaNotFound));
        }

        let paths = walk_paths(&target_id)?;
        debug!("Walking {} over {:?}", target, paths);

        let mut best = ChainResult::with_status(ChainStatus::Incomplete);
        for authority in candidates {
            if cancel.is_cancelled() {
                return Ok(ChainResult::with_status(ChainStatus::Aborted));
            }
            debug!("Trying authority {} at {}", authority.name, authority.root_address);

            let walked = self
                .walk_from(
                    &authority,
                    &target_id,
                    &paths,
                    target_address,
                    platform.as_ref(),
                    cancel,
                )
                .await;
            match walked {
                Ok((true, links)) => {
                    info!(
                        "Chain complete for {} from {} ({} links)",
                        target,
                        authority.name,
                        links.len()
                    );
                    return Ok(ChainResult {
                        status: ChainStatus::Complete,
                        authority: Some(authority),
                        links,
                    });
                }
                Ok((false, links)) => {
                    if best.authority.is_none() || links.len() > best.links.len() {
                        best.authority = Some(authority);
                        best.links = links;
                    }
                }
                Err(Interrupt::Cancelled) => {
                    warn!("Chain walk for {} cancelled", target);
                    return Ok(ChainResult::with_status(ChainStatus::Aborted));
                }
                Err(Interrupt::TimedOut) => {
                    warn!("Chain walk for {} timed out", target);
                    return Ok(ChainResult::with_status(ChainStatus::Aborted));
                }
                Err(Interrupt::Failed(e)) => return Err(e),
            }
        }

        warn!("Chain incomplete for {}", target);
        Ok(best)
    }

    /// Depth-first search from one authority. Returns whether the target was
    /// reached, with the reaching chain or the longest partial chain.
    async fn walk_from(
        &self,
        authority: &CertificateAuthority,
        target: &PathPlatformId,
        paths: &[String],
        target_address: &str,
        platform: &dyn Platform,
        cancel: &CancellationToken,
    ) -> Result<(bool, Vec<ChainLink>), Interrupt> {
        let mut stack = vec![Frame {
            address: authority.root_address.clone(),
            next: 0,
        }];
        let mut links: Vec<ChainLink> = Vec::new();
        let mut longest: Vec<ChainLink> = Vec::new();

        while let Some(frame) = stack.last_mut() {
            if frame.next >= paths.len() {
                stack.pop();
                links.pop();
                continue;
            }
            let index = frame.next;
            frame.next += 1;
            let address = frame.address.clone();

            let name = format!("{}@{}", paths[index], target.platform_name());
            let Some(inspection) = self.hop(&name, &address, cancel).await? else {
                continue;
            };

            // Only the target's own certificate completes the chain, even when
            // the target address also holds an ancestor.
            let reached = index == paths.len() - 1
                && inspection
                    .certificate
                    .holder_addresses()
                    .any(|holder| platform.addresses_equal(holder, target_address, None));
            let next_address = inspection.authority_address().to_string();
            links.push(ChainLink {
                inspection,
                status: Verdict::Verified,
            });
            if links.len() > longest.len() {
                longest = links.clone();
            }
            if reached {
                return Ok((true, links));
            }
            stack.push(Frame {
                address: next_address,
                next: index + 1,
            });
        }

        Ok((false, longest))
    }

    /// Find and verify the certificate for `name` signed by `address`.
    /// `None` when there is no such certificate or it does not verify.
    async fn hop(
        &self,
        name: &str,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Inspection>, Interrupt> {
        if let Some(cached) = self.cached(name, address).await {
            return Ok(self.checked(cached, address));
        }

        let found = tokio::select! {
            _ = cancel.cancelled() => return Err(Interrupt::Cancelled),
            found = tokio::time::timeout(self.lookup_timeout, self.lookup.find(name, address)) => {
                found.map_err(|_| Interrupt::TimedOut)??
            }
        };
        let Some(envelope) = found else {
            debug!("No certificate for {} signed by {}", name, address);
            return Ok(None);
        };

        let inspection = match self
            .verifier
            .inspector()
            .inspect(&CertificateSource::Envelope(envelope))
            .await
        {
            Ok(inspection) => inspection,
            Err(e) => {
                warn!("Skipping undecodable certificate for {}: {}", name, e);
                return Ok(None);
            }
        };

        let checked = self.checked(inspection, address);
        if let (Some(cache), Some(inspection)) = (self.cache, &checked) {
            if let Err(e) = cache.store(inspection).await {
                warn!("Failed to cache inspection {}: {}", inspection.cache_key(), e);
            }
        }
        Ok(checked)
    }

    async fn cached(&self, name: &str, address: &str) -> Option<Inspection> {
        self.cache?.get(name, address).await
    }

    fn checked(&self, inspection: Inspection, parent: &str) -> Option<Inspection> {
        match self.verifier.verify(&inspection, Some(parent)) {
            Verdict::Verified => Some(inspection),
            Verdict::Rejected(_) => None,
        }
    }
}

/// Ancestor paths root-most first without the root itself, then the target.
fn walk_paths(target: &PathPlatformId) -> Result<Vec<String>, ChainError> {
    let mut paths: Vec<String> = target
        .ancestors()?
        .into_iter()
        .rev()
        .map(|ancestor| ancestor.path_name().to_string())
        .filter(|path| !path.is_empty())
        .collect();
    paths.push(target.path_name().to_string());
    Ok(paths)
}
