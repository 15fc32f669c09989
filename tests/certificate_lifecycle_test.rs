mod common;

use std::path::Path;
use std::time::Duration;

use addrcert::certificate::{
    embed_certificate, CertificateEnvelope, CertificateError, CertificateSource, Inspector,
    Issuer, Rejection, RequestBuilder, RequestKind, Verdict, Verifier,
};
use addrcert::modules::crypto::{base64_decode, base64_encode};
use addrcert::modules::image::ImageDeadline;
use addrcert::modules::platform::PlatformRegistry;
use addrcert::modules::secure_keys::PrivateKey;
use common::{
    eth, identity, init_logging, marked_image, plain_image, FakeImage, MemoryImages, StalledImages,
};
use tokio_util::sync::CancellationToken;

const CODE: u64 = 918_273;
const CA_NONCE: u64 = 7;

struct Fixture {
    platforms: PlatformRegistry,
    images: MemoryImages,
    root_key: PrivateKey,
    root_address: String,
    ca_envelope: CertificateEnvelope,
    token_id: String,
}

async fn fixture() -> Fixture {
    init_logging();
    let platforms = PlatformRegistry::with_defaults();
    let images = MemoryImages::new();
    let eth = eth(&platforms);
    let root_key = eth.generate_key().unwrap();
    let root_address = eth.address(&root_key, None).unwrap();

    let request = RequestBuilder::new(RequestKind::Ca)
        .subject(identity("@eth"))
        .email("root@example.com")
        .contract_nonce(CA_NONCE)
        .build(&platforms, &images, &root_key, None)
        .await
        .unwrap();
    let ca_envelope = Issuer::new(&platforms, identity("@eth"), "root@example.com", &root_key)
        .issue(&request, None)
        .unwrap();
    let token_id = request.request_address.clone();

    Fixture {
        platforms,
        images,
        root_key,
        root_address,
        ca_envelope,
        token_id,
    }
}

#[tokio::test]
async fn test_ca_certificate_is_self_signed() {
    let f = fixture().await;
    let eth = eth(&f.platforms);
    let inspector = Inspector::new(&f.platforms, &f.images);

    let inspection = inspector
        .inspect(&CertificateSource::Envelope(f.ca_envelope.clone()))
        .await
        .unwrap();
    let certificate = &inspection.certificate;

    assert!(eth.addresses_equal(&inspection.signature_address, &f.root_address, None));
    assert_eq!(certificate.subject.name, certificate.issuer.name);
    assert_eq!(
        certificate.request_address,
        eth.address(&f.root_key, Some(CA_NONCE)).unwrap()
    );
    assert_eq!(certificate.id, format!("{}#0", certificate.request_address));
    assert_eq!(inspection.authority_address(), inspection.request_signature_address);

    let verifier = Verifier::new(inspector);
    assert_eq!(verifier.verify(&inspection, None), Verdict::Verified);
    assert_eq!(
        verifier.verify(&inspection, Some(&f.root_address)),
        Verdict::Verified
    );
}

#[tokio::test]
async fn test_domain_certificate_verifies_from_image() {
    let f = fixture().await;
    let eth = eth(&f.platforms);
    marked_image(&f.images, "logo.png", eth.as_ref(), &f.root_key, CODE, "name.tld@eth").await;

    let request = RequestBuilder::new(RequestKind::Domain)
        .subject(identity("name.tld@eth"))
        .email("admin@name.tld")
        .image("logo.png")
        .build(&f.platforms, &f.images, &f.root_key, None)
        .await
        .unwrap();
    let envelope = Issuer::new(&f.platforms, identity("@eth"), "root@example.com", &f.root_key)
        .issue(&request, Some(&f.token_id))
        .unwrap();
    embed_certificate(
        &f.images,
        &envelope,
        Path::new("logo.png"),
        Path::new("logo.cert.png"),
    )
    .await
    .unwrap();

    let verifier = Verifier::new(Inspector::new(&f.platforms, &f.images));
    let source = CertificateSource::Image("logo.cert.png".into());
    let verdict = verifier
        .verify_source(&source, Some(&f.root_address))
        .await
        .unwrap();
    assert_eq!(verdict, Verdict::Verified);
    assert_eq!(verdict.to_string(), "Verified");

    let inspection = verifier.inspector().inspect(&source).await.unwrap();
    let evidence = inspection.image.as_ref().unwrap();
    assert_eq!(evidence.code, Some(CODE));
    assert_eq!(evidence.image_hash, inspection.certificate.image_hash);
    assert!(eth.addresses_equal(
        evidence.signature_mark_address.as_deref().unwrap(),
        &f.root_address,
        None
    ));
}

#[tokio::test]
async fn test_corrupted_issuer_path_is_rejected() {
    let f = fixture().await;
    let eth = eth(&f.platforms);
    marked_image(&f.images, "logo.png", eth.as_ref(), &f.root_key, CODE, "name.tld@eth").await;

    let request = RequestBuilder::new(RequestKind::Domain)
        .subject(identity("name.tld@eth"))
        .email("admin@name.tld")
        .image("logo.png")
        .build(&f.platforms, &f.images, &f.root_key, None)
        .await
        .unwrap();
    let envelope = Issuer::new(&f.platforms, identity("@eth"), "root@example.com", &f.root_key)
        .issue(&request, Some(&f.token_id))
        .unwrap();

    let (mut certificate, _) = envelope.open().unwrap();
    certificate.issuer.name = "other.tld@eth".to_string();
    let source = CertificateSource::Structure {
        certificate,
        signature: envelope.signature.clone(),
    };

    let verifier = Verifier::new(Inspector::new(&f.platforms, &f.images));
    let verdict = verifier.verify_source(&source, None).await.unwrap();
    assert!(matches!(
        verdict,
        Verdict::Rejected(Rejection::InvalidIssuerPath { .. })
    ));
    assert!(verdict.to_string().starts_with("Issuer path is invalid"));
}

#[tokio::test]
async fn test_issuer_refuses_inadmissible_path() {
    let f = fixture().await;
    let eth = eth(&f.platforms);
    plain_image(&f.images, "badge.png").await;
    let wildcard_key = eth.generate_key().unwrap();

    let request = RequestBuilder::new(RequestKind::Address)
        .subject(identity("name.tld@eth"))
        .email("admin@name.tld")
        .image("badge.png")
        .build(&f.platforms, &f.images, &f.root_key, None)
        .await
        .unwrap();

    let err = Issuer::new(&f.platforms, identity("*.com@eth"), "ca@example.com", &wildcard_key)
        .issue(&request, None)
        .unwrap_err();
    assert!(matches!(err, CertificateError::InvalidIssuerPath { .. }));

    let err = Issuer::new(&f.platforms, identity("*.tld@eth:goerli"), "ca@example.com", &wildcard_key)
        .issue(&request, None)
        .unwrap_err();
    assert!(matches!(err, CertificateError::IncompatiblePlatform { .. }));

    let domain_request = RequestBuilder::new(RequestKind::Domain)
        .subject(identity("name.tld@eth"))
        .email("admin@name.tld")
        .image("badge.png")
        .code(CODE)
        .build(&f.platforms, &f.images, &f.root_key, None)
        .await
        .unwrap();
    let err = Issuer::new(&f.platforms, identity("@eth"), "root@example.com", &f.root_key)
        .issue(&domain_request, None)
        .unwrap_err();
    assert!(matches!(err, CertificateError::MissingField("tokenId")));
}

#[tokio::test]
async fn test_ca_issuance_requires_own_key() {
    let f = fixture().await;
    let eth = eth(&f.platforms);
    let other_key = eth.generate_key().unwrap();

    let request = RequestBuilder::new(RequestKind::Ca)
        .subject(identity("@eth"))
        .email("root@example.com")
        .build(&f.platforms, &f.images, &f.root_key, None)
        .await
        .unwrap();

    let err = Issuer::new(&f.platforms, identity("@eth"), "root@example.com", &other_key)
        .issue(&request, None)
        .unwrap_err();
    assert!(matches!(err, CertificateError::NotSelfSigned(_)));

    let err = Issuer::new(&f.platforms, identity("@eth:goerli"), "root@example.com", &f.root_key)
        .issue(&request, None)
        .unwrap_err();
    assert!(matches!(err, CertificateError::NotSelfSigned(_)));
}

#[tokio::test]
async fn test_tampering_is_distinguished() {
    let f = fixture().await;
    let verifier = Verifier::new(Inspector::new(&f.platforms, &f.images));

    let mut compressed = base64_decode(&f.ca_envelope.certificate).unwrap();
    compressed[0] ^= 0x80;
    let corrupted = CertificateEnvelope {
        certificate: base64_encode(&compressed),
        ..f.ca_envelope.clone()
    };
    let verdict = verifier
        .verify_source(&CertificateSource::Envelope(corrupted), None)
        .await
        .unwrap();
    assert!(matches!(
        verdict,
        Verdict::Rejected(Rejection::PayloadCorrupted(_))
    ));

    let mut signature: Vec<char> = f.ca_envelope.signature.chars().collect();
    signature[10] = if signature[10] == 'a' { 'b' } else { 'a' };
    let resigned = CertificateEnvelope {
        signature: signature.into_iter().collect(),
        ..f.ca_envelope.clone()
    };
    let verdict = verifier
        .verify_source(&CertificateSource::Envelope(resigned), None)
        .await
        .unwrap();
    assert!(matches!(
        verdict,
        Verdict::Rejected(Rejection::SignatureMismatch(_) | Rejection::NotSelfSigned(_))
    ));

    let unknown = CertificateEnvelope {
        format: "plain".to_string(),
        ..f.ca_envelope.clone()
    };
    let verdict = verifier
        .verify_source(&CertificateSource::Envelope(unknown), None)
        .await
        .unwrap();
    assert!(matches!(
        verdict,
        Verdict::Rejected(Rejection::PayloadCorrupted(_))
    ));
}

#[tokio::test]
async fn test_inspection_is_idempotent() {
    let f = fixture().await;
    let inspector = Inspector::new(&f.platforms, &f.images);
    let source = CertificateSource::Envelope(f.ca_envelope.clone());

    let first = serde_json::to_vec(&inspector.inspect(&source).await.unwrap()).unwrap();
    let second = serde_json::to_vec(&inspector.inspect(&source).await.unwrap()).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_co_signed_address_request() {
    let f = fixture().await;
    let eth = eth(&f.platforms);
    plain_image(&f.images, "wallet.png").await;
    let owner_key = eth.generate_key().unwrap();
    let deployer_key = eth.generate_key().unwrap();

    let request = RequestBuilder::new(RequestKind::Address)
        .subject(identity("wallet.tld@eth"))
        .email("owner@wallet.tld")
        .image("wallet.png")
        .contract_nonce(3)
        .data("treasury")
        .build(&f.platforms, &f.images, &owner_key, Some(&deployer_key))
        .await
        .unwrap();

    assert_eq!(request.request_address, eth.address(&owner_key, None).unwrap());
    assert_eq!(
        request.for_address.as_deref(),
        Some(eth.address(&deployer_key, Some(3)).unwrap().as_str())
    );
    assert_eq!(request.request_nonce(), None);

    let envelope = Issuer::new(&f.platforms, identity("@eth"), "root@example.com", &f.root_key)
        .issue(&request, None)
        .unwrap();
    let verifier = Verifier::new(Inspector::new(&f.platforms, &f.images));
    let inspection = verifier
        .inspector()
        .inspect(&CertificateSource::Envelope(envelope))
        .await
        .unwrap();
    assert!(eth.addresses_equal(
        inspection.for_signature_address.as_deref().unwrap(),
        &eth.address(&deployer_key, None).unwrap(),
        None
    ));
    assert_eq!(
        verifier.verify(&inspection, Some(&f.root_address)),
        Verdict::Verified
    );

    let mut forged = inspection.clone();
    forged.for_signature_address = Some(eth.address(&owner_key, None).unwrap());
    assert!(matches!(
        verifier.verify(&forged, None),
        Verdict::Rejected(Rejection::ForSignatureMismatch { .. })
    ));
}

#[tokio::test]
async fn test_token_certificate_id_is_its_path() {
    let f = fixture().await;
    let eth = eth(&f.platforms);
    plain_image(&f.images, "token.png").await;
    let holder_key = eth.generate_key().unwrap();
    let name = format!("{}#1@eth", f.token_id);

    let request = RequestBuilder::new(RequestKind::Token)
        .subject(identity(&name))
        .email("holder@example.com")
        .image("token.png")
        .build(&f.platforms, &f.images, &holder_key, None)
        .await
        .unwrap();
    let envelope = Issuer::new(&f.platforms, identity("@eth"), "root@example.com", &f.root_key)
        .issue(&request, None)
        .unwrap();
    let (certificate, _) = envelope.open().unwrap();
    assert_eq!(certificate.id, format!("{}#1", f.token_id));

    let verifier = Verifier::new(Inspector::new(&f.platforms, &f.images));
    let verdict = verifier
        .verify_source(&CertificateSource::Envelope(envelope), Some(&f.root_address))
        .await
        .unwrap();
    assert_eq!(verdict, Verdict::Verified);
}

#[tokio::test]
async fn test_envelope_file_round_trip() {
    let f = fixture().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("root.cert.json");

    f.ca_envelope.write_file(&path).await.unwrap();
    assert!(!path.with_extension("tmp").exists());
    assert_eq!(
        CertificateEnvelope::read_file(&path).await.unwrap(),
        f.ca_envelope
    );

    let verifier = Verifier::new(Inspector::new(&f.platforms, &f.images));
    let verdict = verifier
        .verify_source(&CertificateSource::File(path), Some(&f.root_address))
        .await
        .unwrap();
    assert_eq!(verdict, Verdict::Verified);

    let missing = verifier
        .verify_source(
            &CertificateSource::File(dir.path().join("missing.json")),
            None,
        )
        .await;
    assert!(matches!(missing, Err(CertificateError::Io(_))));
}

#[tokio::test]
async fn test_image_hash_mismatch() {
    let f = fixture().await;
    let eth = eth(&f.platforms);
    marked_image(&f.images, "logo.png", eth.as_ref(), &f.root_key, CODE, "name.tld@eth").await;

    let request = RequestBuilder::new(RequestKind::Domain)
        .subject(identity("name.tld@eth"))
        .email("admin@name.tld")
        .image("logo.png")
        .build(&f.platforms, &f.images, &f.root_key, None)
        .await
        .unwrap();
    let envelope = Issuer::new(&f.platforms, identity("@eth"), "root@example.com", &f.root_key)
        .issue(&request, Some(&f.token_id))
        .unwrap();

    // Same code and mark, different pixels.
    marked_image(&f.images, "copy.png", eth.as_ref(), &f.root_key, CODE, "name.tld@eth").await;
    embed_certificate(&f.images, &envelope, Path::new("copy.png"), Path::new("copy.cert.png"))
        .await
        .unwrap();

    let verifier = Verifier::new(Inspector::new(&f.platforms, &f.images));
    let verdict = verifier
        .verify_source(&CertificateSource::Image("copy.cert.png".into()), None)
        .await
        .unwrap();
    assert!(matches!(
        verdict,
        Verdict::Rejected(Rejection::ImageHashMismatch { .. })
    ));
}

#[tokio::test]
async fn test_unusable_issuer_name_is_schema_rejection() {
    let f = fixture().await;
    plain_image(&f.images, "badge.png").await;
    let request = RequestBuilder::new(RequestKind::Address)
        .subject(identity("name.tld@eth"))
        .email("admin@name.tld")
        .image("badge.png")
        .build(&f.platforms, &f.images, &f.root_key, None)
        .await
        .unwrap();
    let envelope = Issuer::new(&f.platforms, identity("@eth"), "root@example.com", &f.root_key)
        .issue(&request, None)
        .unwrap();
    let verifier = Verifier::new(Inspector::new(&f.platforms, &f.images));

    for (issuer_name, expected) in [("@btc", "btc"), ("no-platform", "no-platform")] {
        let (mut certificate, _) = envelope.open().unwrap();
        certificate.issuer.name = issuer_name.to_string();
        let source = CertificateSource::Structure {
            certificate,
            signature: envelope.signature.clone(),
        };

        match verifier.verify_source(&source, None).await.unwrap() {
            Verdict::Rejected(Rejection::Schema(reason)) => {
                assert!(reason.contains(expected), "{issuer_name}: {reason}")
            }
            other => panic!("{issuer_name}: expected schema rejection, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_domain_image_without_mark_or_code_is_rejected() {
    let f = fixture().await;
    let eth = eth(&f.platforms);
    marked_image(&f.images, "logo.png", eth.as_ref(), &f.root_key, CODE, "name.tld@eth").await;

    let request = RequestBuilder::new(RequestKind::Domain)
        .subject(identity("name.tld@eth"))
        .email("admin@name.tld")
        .image("logo.png")
        .build(&f.platforms, &f.images, &f.root_key, None)
        .await
        .unwrap();
    let envelope = Issuer::new(&f.platforms, identity("@eth"), "root@example.com", &f.root_key)
        .issue(&request, Some(&f.token_id))
        .unwrap();

    let original = f.images.get(Path::new("logo.png")).await.unwrap();
    let unmarked = FakeImage {
        mark: None,
        ..original.clone()
    };
    let uncoded = FakeImage {
        code: None,
        ..original
    };
    let verifier = Verifier::new(Inspector::new(&f.platforms, &f.images));

    for (name, image) in [("unmarked.png", unmarked), ("uncoded.png", uncoded)] {
        let output = format!("{name}.cert.png");
        f.images.insert(name, image).await;
        embed_certificate(&f.images, &envelope, Path::new(name), Path::new(&output))
            .await
            .unwrap();

        let verdict = verifier
            .verify_source(&CertificateSource::Image(output.into()), Some(&f.root_address))
            .await
            .unwrap();
        assert_eq!(
            verdict,
            Verdict::Rejected(Rejection::MissingSignatureMark),
            "{name}"
        );
    }
}

#[tokio::test]
async fn test_stalled_image_adapter_is_aborted() {
    let f = fixture().await;
    let verifier = Verifier::new(
        Inspector::new(&f.platforms, &StalledImages)
            .with_image_deadline(ImageDeadline::new(Duration::from_millis(20))),
    );

    let err = verifier
        .verify_source(&CertificateSource::Image("logo.cert.png".into()), None)
        .await
        .unwrap_err();
    assert!(err.is_aborted(), "{err}");

    // Certificates that need no image are unaffected.
    let verdict = verifier
        .verify_source(&CertificateSource::Envelope(f.ca_envelope.clone()), None)
        .await
        .unwrap();
    assert_eq!(verdict, Verdict::Verified);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = RequestBuilder::new(RequestKind::Address)
        .subject(identity("name.tld@eth"))
        .email("admin@name.tld")
        .image("badge.png")
        .image_deadline(ImageDeadline::new(Duration::from_secs(30)).with_cancel(cancel))
        .build(&f.platforms, &StalledImages, &f.root_key, None)
        .await
        .unwrap_err();
    assert!(err.is_aborted(), "{err}");
}
