mod common;

use std::sync::Arc;
use std::time::Duration;

use addrcert::certificate::{
    CertificateEnvelope, Inspector, Issuer, RequestBuilder, RequestKind, Verifier,
};
use addrcert::chain::{
    CaRegistry, CertificateLookup, ChainError, ChainStatus, ChainWalker, InspectionCache,
    StoredLookup,
};
use addrcert::modules::platform::PlatformRegistry;
use addrcert::modules::secure_keys::PrivateKey;
use addrcert::modules::storage::{MemoryStorage, Storage};
use async_trait::async_trait;
use common::{eth, identity, init_logging, plain_image, MemoryImages};
use tokio_util::sync::CancellationToken;

struct Hierarchy {
    ca: CertificateEnvelope,
    wildcard: CertificateEnvelope,
    leaf: CertificateEnvelope,
    root_address: String,
    wildcard_address: String,
    leaf_address: String,
}

async fn address_request(
    platforms: &PlatformRegistry,
    images: &MemoryImages,
    name: &str,
    key: &PrivateKey,
) -> addrcert::certificate::CertificateRequest {
    let image = format!("{name}.png");
    plain_image(images, &image).await;
    RequestBuilder::new(RequestKind::Address)
        .subject(identity(name))
        .email("admin@name.tld")
        .image(image)
        .build(platforms, images, key, None)
        .await
        .unwrap()
}

/// `@eth` -> `*.tld@eth` -> `name.tld@eth`, each level with its own key.
async fn hierarchy(platforms: &PlatformRegistry, images: &MemoryImages) -> Hierarchy {
    let eth = eth(platforms);
    let root_key = eth.generate_key().unwrap();
    let wildcard_key = eth.generate_key().unwrap();
    let leaf_key = eth.generate_key().unwrap();

    let ca_request = RequestBuilder::new(RequestKind::Ca)
        .subject(identity("@eth"))
        .email("root@example.com")
        .build(platforms, images, &root_key, None)
        .await
        .unwrap();
    let root = Issuer::new(platforms, identity("@eth"), "root@example.com", &root_key);
    let ca = root.issue(&ca_request, None).unwrap();

    let wildcard_request = address_request(platforms, images, "*.tld@eth", &wildcard_key).await;
    let wildcard = root.issue(&wildcard_request, None).unwrap();

    let leaf_request = address_request(platforms, images, "name.tld@eth", &leaf_key).await;
    let leaf = Issuer::new(platforms, identity("*.tld@eth"), "ca@tld.example", &wildcard_key)
        .issue(&leaf_request, None)
        .unwrap();

    Hierarchy {
        ca,
        wildcard,
        leaf,
        root_address: eth.address(&root_key, None).unwrap(),
        wildcard_address: eth.address(&wildcard_key, None).unwrap(),
        leaf_address: eth.address(&leaf_key, None).unwrap(),
    }
}

struct World {
    platforms: PlatformRegistry,
    images: MemoryImages,
    storage: Arc<dyn Storage>,
    hierarchy: Hierarchy,
}

async fn world() -> World {
    init_logging();
    let platforms = PlatformRegistry::with_defaults();
    let images = MemoryImages::new();
    let hierarchy = hierarchy(&platforms, &images).await;
    World {
        platforms,
        images,
        storage: Arc::new(MemoryStorage::new()),
        hierarchy,
    }
}

#[tokio::test]
async fn test_three_level_chain_is_complete() {
    let w = world().await;
    let verifier = Verifier::new(Inspector::new(&w.platforms, &w.images));
    let registry = CaRegistry::new(w.storage.clone());
    let lookup = StoredLookup::new(w.storage.clone());

    let authority = registry.add(&verifier, &w.hierarchy.ca).await.unwrap();
    assert_eq!(authority.name, "@eth");
    assert_eq!(authority.root_address, w.hierarchy.root_address);
    lookup.publish(verifier.inspector(), &w.hierarchy.wildcard).await.unwrap();
    lookup.publish(verifier.inspector(), &w.hierarchy.leaf).await.unwrap();

    let walker = ChainWalker::new(&verifier, &registry, &lookup);
    let result = walker
        .walk("name.tld@eth", &w.hierarchy.leaf_address, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, ChainStatus::Complete);
    assert_eq!(result.authority.unwrap().name, "@eth");
    let names: Vec<&str> = result
        .links
        .iter()
        .map(|link| link.inspection.certificate.subject.name.as_str())
        .collect();
    assert_eq!(names, vec!["*.tld@eth", "name.tld@eth"]);
    assert!(result.links.iter().all(|link| link.status.is_verified()));
}

#[tokio::test]
async fn test_missing_middle_certificate_is_incomplete() {
    let w = world().await;
    let verifier = Verifier::new(Inspector::new(&w.platforms, &w.images));
    let registry = CaRegistry::new(w.storage.clone());
    let lookup = StoredLookup::new(w.storage.clone());

    registry.add(&verifier, &w.hierarchy.ca).await.unwrap();
    lookup.publish(verifier.inspector(), &w.hierarchy.wildcard).await.unwrap();
    lookup.publish(verifier.inspector(), &w.hierarchy.leaf).await.unwrap();
    assert!(lookup
        .withdraw("*.tld@eth", &w.hierarchy.root_address)
        .await
        .unwrap());

    let walker = ChainWalker::new(&verifier, &registry, &lookup);
    let result = walker
        .walk("name.tld@eth", &w.hierarchy.leaf_address, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, ChainStatus::Incomplete);
    assert!(result.links.is_empty());
    assert_eq!(result.authority.unwrap().name, "@eth");
}

#[tokio::test]
async fn test_wrong_holder_is_incomplete_with_partial_chain() {
    let w = world().await;
    let verifier = Verifier::new(Inspector::new(&w.platforms, &w.images));
    let registry = CaRegistry::new(w.storage.clone());
    let lookup = StoredLookup::new(w.storage.clone());

    registry.add(&verifier, &w.hierarchy.ca).await.unwrap();
    lookup.publish(verifier.inspector(), &w.hierarchy.wildcard).await.unwrap();
    lookup.publish(verifier.inspector(), &w.hierarchy.leaf).await.unwrap();

    let stranger = eth(&w.platforms).generate_key().unwrap();
    let stranger_address = eth(&w.platforms).address(&stranger, None).unwrap();
    let walker = ChainWalker::new(&verifier, &registry, &lookup);
    let result = walker
        .walk("name.tld@eth", &stranger_address, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, ChainStatus::Incomplete);
    assert_eq!(result.links.len(), 2);
}

#[tokio::test]
async fn test_ancestor_holder_does_not_complete_chain() {
    let w = world().await;
    let verifier = Verifier::new(Inspector::new(&w.platforms, &w.images));
    let registry = CaRegistry::new(w.storage.clone());
    let lookup = StoredLookup::new(w.storage.clone());

    registry.add(&verifier, &w.hierarchy.ca).await.unwrap();
    lookup.publish(verifier.inspector(), &w.hierarchy.wildcard).await.unwrap();
    lookup.publish(verifier.inspector(), &w.hierarchy.leaf).await.unwrap();

    // The wildcard holder owns `*.tld@eth`, not `name.tld@eth`.
    let walker = ChainWalker::new(&verifier, &registry, &lookup);
    let result = walker
        .walk("name.tld@eth", &w.hierarchy.wildcard_address, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.status, ChainStatus::Incomplete);
    assert_eq!(result.links.len(), 2);

    let result = walker
        .walk("*.tld@eth", &w.hierarchy.wildcard_address, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.status, ChainStatus::Complete);
    assert_eq!(result.links.len(), 1);
}

#[tokio::test]
async fn test_no_compatible_authority() {
    let w = world().await;
    let verifier = Verifier::new(Inspector::new(&w.platforms, &w.images));
    let registry = CaRegistry::new(w.storage.clone());
    let lookup = StoredLookup::new(w.storage.clone());
    let walker = ChainWalker::new(&verifier, &registry, &lookup);

    let result = walker
        .walk("name.tld@eth", &w.hierarchy.leaf_address, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.status, ChainStatus::CaNotFound);

    registry.add(&verifier, &w.hierarchy.ca).await.unwrap();
    let result = walker
        .walk(
            "name.tld@eth:goerli",
            &w.hierarchy.leaf_address,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_ne!(result.status, ChainStatus::CaNotFound);
}

#[tokio::test]
async fn test_registry_rejects_non_authority() {
    let w = world().await;
    let verifier = Verifier::new(Inspector::new(&w.platforms, &w.images));
    let registry = CaRegistry::new(w.storage.clone());

    let err = registry.add(&verifier, &w.hierarchy.wildcard).await.unwrap_err();
    assert!(matches!(err, ChainError::NotAnAuthority(_)));
    assert!(registry.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancelled_walk_is_aborted() {
    let w = world().await;
    let verifier = Verifier::new(Inspector::new(&w.platforms, &w.images));
    let registry = CaRegistry::new(w.storage.clone());
    let lookup = StoredLookup::new(w.storage.clone());
    registry.add(&verifier, &w.hierarchy.ca).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let walker = ChainWalker::new(&verifier, &registry, &lookup);
    let result = walker
        .walk("name.tld@eth", &w.hierarchy.leaf_address, &cancel)
        .await
        .unwrap();
    assert_eq!(result.status, ChainStatus::Aborted);
}

struct StalledLookup;

#[async_trait]
impl CertificateLookup for StalledLookup {
    async fn find(
        &self,
        _name: &str,
        _issuer_address: &str,
    ) -> Result<Option<CertificateEnvelope>, ChainError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(None)
    }
}

#[tokio::test]
async fn test_stalled_lookup_is_aborted() {
    let w = world().await;
    let verifier = Verifier::new(Inspector::new(&w.platforms, &w.images));
    let registry = CaRegistry::new(w.storage.clone());
    registry.add(&verifier, &w.hierarchy.ca).await.unwrap();

    let walker = ChainWalker::new(&verifier, &registry, &StalledLookup)
        .with_lookup_timeout(Duration::from_millis(20));
    let result = walker
        .walk("name.tld@eth", &w.hierarchy.leaf_address, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.status, ChainStatus::Aborted);
}

#[tokio::test]
async fn test_walk_populates_inspection_cache() {
    let w = world().await;
    let verifier = Verifier::new(Inspector::new(&w.platforms, &w.images));
    let registry = CaRegistry::new(w.storage.clone());
    let lookup = StoredLookup::new(w.storage.clone());
    registry.add(&verifier, &w.hierarchy.ca).await.unwrap();
    lookup.publish(verifier.inspector(), &w.hierarchy.wildcard).await.unwrap();
    lookup.publish(verifier.inspector(), &w.hierarchy.leaf).await.unwrap();

    let secret = [9u8; 32];
    let cache = InspectionCache::new(secret, Duration::from_secs(60), 100)
        .with_storage(w.storage.clone());
    let walker = ChainWalker::new(&verifier, &registry, &lookup).with_cache(&cache);
    let result = walker
        .walk("name.tld@eth", &w.hierarchy.leaf_address, &CancellationToken::new())
        .await
        .unwrap();
    assert!(result.is_complete());

    let wildcard = cache
        .get("*.tld@eth", &w.hierarchy.root_address)
        .await
        .unwrap();
    assert_eq!(wildcard.certificate.subject.name, "*.tld@eth");

    // A fresh cache over the same storage and secret sees the mirrored entry.
    let reopened = InspectionCache::new(secret, Duration::from_secs(60), 100)
        .with_storage(w.storage.clone());
    let leaf = reopened
        .get("name.tld@eth", &w.hierarchy.wildcard_address)
        .await
        .unwrap();
    assert_eq!(leaf.certificate.subject.name, "name.tld@eth");

    // A different secret does not trust it.
    let foreign = InspectionCache::new([1u8; 32], Duration::from_secs(60), 100)
        .with_storage(w.storage.clone());
    assert!(foreign
        .get("name.tld@eth", &w.hierarchy.wildcard_address)
        .await
        .is_none());

    // Cached links keep serving the walk.
    let cached = walker
        .walk("name.tld@eth", &w.hierarchy.leaf_address, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(cached.links.len(), 2);
}
