//! End-to-end signing and verification.

mod common;

use chrono::{DateTime, Utc};
use common::{one_page_pdf, test_identity, two_page_pdf, PASSWORD};
use pdf_signet::{
    verify, verify_against, DigestAlgorithm, Error, PdfSigner, Rect, SignatureSubFilter,
    SigningConfig,
};

fn pinned_config() -> SigningConfig {
    let instant = "2026-01-15T09:30:00Z".parse::<DateTime<Utc>>().unwrap();
    SigningConfig::new().with_signing_time(instant)
}

#[test]
fn test_signed_output_preserves_original_bytes() {
    let original = one_page_pdf();
    let identity = test_identity(1, "Alice Example");

    let signer = PdfSigner::new(pinned_config());
    let signed = signer.sign(&original, &identity.container, PASSWORD).unwrap();

    assert!(signed.len() > original.len());
    assert_eq!(&signed[..original.len()], original.as_slice());
    assert!(signed.ends_with(b"%%EOF\n"));
}

#[test]
fn test_signed_document_verifies() {
    let identity = test_identity(2, "Bob Example");
    let config = pinned_config()
        .with_reason("Contract execution")
        .with_location("Vienna")
        .with_contact("legal@example.com");

    let signed = PdfSigner::new(config)
        .sign(&one_page_pdf(), &identity.container, PASSWORD)
        .unwrap();

    let infos = verify(&signed).unwrap();
    assert_eq!(infos.len(), 1);
    let info = &infos[0];
    assert_eq!(info.field_name.as_deref(), Some("Signature1"));
    assert_eq!(info.signer_name.as_deref(), Some("Bob Example"));
    assert_eq!(info.reason.as_deref(), Some("Contract execution"));
    assert_eq!(info.location.as_deref(), Some("Vienna"));
    assert_eq!(info.contact_info.as_deref(), Some("legal@example.com"));
    assert_eq!(
        info.signing_time.as_deref(),
        Some("D:20260115093000+00'00'")
    );
    assert_eq!(info.sub_filter, Some(SignatureSubFilter::Pkcs7Detached));
    assert_eq!(info.byte_range.len(), 4);
    assert_eq!(info.byte_range[0], 0);
}

#[test]
fn test_verify_against_pins_the_certificate() {
    let alice = test_identity(3, "Alice Example");
    let mallory = test_identity(4, "Mallory Example");

    let signed = PdfSigner::new(pinned_config())
        .sign(&one_page_pdf(), &alice.container, PASSWORD)
        .unwrap();

    assert!(verify_against(&signed, &alice.cert_der).is_ok());
    assert!(matches!(
        verify_against(&signed, &mallory.cert_der),
        Err(Error::SigningFailed(_))
    ));
}

#[test]
fn test_tampered_document_fails_verification() {
    let identity = test_identity(5, "Carol Example");
    let mut signed = PdfSigner::new(pinned_config())
        .sign(&one_page_pdf(), &identity.container, PASSWORD)
        .unwrap();

    // Flip one byte inside the original (covered) region
    signed[20] ^= 0x01;
    assert!(matches!(verify(&signed), Err(Error::SigningFailed(_))));
}

#[test]
fn test_page_bounds_are_validated() {
    let identity = test_identity(6, "Dave Example");
    let pdf = two_page_pdf();

    for page in [0usize, 3] {
        let config = pinned_config().with_page(page);
        match PdfSigner::new(config).sign(&pdf, &identity.container, PASSWORD) {
            Err(Error::PageOutOfRange { requested, page_count }) => {
                assert_eq!(requested, page);
                assert_eq!(page_count, 2);
            },
            other => panic!("expected PageOutOfRange, got {:?}", other.map(|_| ())),
        }
    }

    // Page 2 of a two-page document is fine
    let config = pinned_config().with_page(2);
    assert!(PdfSigner::new(config)
        .sign(&pdf, &identity.container, PASSWORD)
        .is_ok());
}

#[test]
fn test_degenerate_rectangles_are_rejected() {
    let identity = test_identity(7, "Eve Example");
    for rect in [
        Rect::new(100.0, 50.0, 100.0, 200.0), // zero width
        Rect::new(100.0, 200.0, 300.0, 50.0), // inverted
    ] {
        let config = pinned_config().with_signature_box(rect);
        assert!(matches!(
            PdfSigner::new(config).sign(&one_page_pdf(), &identity.container, PASSWORD),
            Err(Error::InvalidGeometry(_))
        ));
    }
}

#[test]
fn test_placeholder_too_small() {
    let identity = test_identity(8, "Frank Example");
    let config = pinned_config().with_placeholder_hex_len(64);

    match PdfSigner::new(config).sign(&one_page_pdf(), &identity.container, PASSWORD) {
        Err(Error::PlaceholderTooSmall { needed, capacity }) => {
            assert_eq!(capacity, 32);
            assert!(needed > capacity);
        },
        other => panic!("expected PlaceholderTooSmall, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_two_sequential_signatures_both_verify() {
    let alice = test_identity(9, "Alice Example");
    let bob = test_identity(10, "Bob Example");

    let later = "2026-02-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
    let once = PdfSigner::new(pinned_config())
        .sign(&one_page_pdf(), &alice.container, PASSWORD)
        .unwrap();
    let twice = PdfSigner::new(
        pinned_config()
            .with_field_name("Signature2")
            .with_signing_time(later),
    )
    .sign(&once, &bob.container, PASSWORD)
    .unwrap();

    // The second signing is itself an incremental update over the first
    assert_eq!(&twice[..once.len()], once.as_slice());

    let infos = verify(&twice).unwrap();
    assert_eq!(infos.len(), 2);
    let names: Vec<_> = infos
        .iter()
        .filter_map(|info| info.field_name.as_deref())
        .collect();
    assert!(names.contains(&"Signature1"));
    assert!(names.contains(&"Signature2"));
    let times: Vec<_> = infos
        .iter()
        .filter_map(|info| info.signing_time.as_deref())
        .collect();
    assert!(times.contains(&"D:20260115093000+00'00'"));
    assert!(times.contains(&"D:20260201120000+00'00'"));
}

#[test]
fn test_pinned_signing_time_is_deterministic() {
    let identity = test_identity(11, "Grace Example");
    let pdf = one_page_pdf();

    let first = PdfSigner::new(pinned_config())
        .sign(&pdf, &identity.container, PASSWORD)
        .unwrap();
    let second = PdfSigner::new(pinned_config())
        .sign(&pdf, &identity.container, PASSWORD)
        .unwrap();

    assert_eq!(first, second);
    let appended = &first[pdf.len()..];
    let text = String::from_utf8_lossy(appended);
    assert!(text.contains("D:20260115093000+00'00'"));
}

#[test]
fn test_alternate_digest_algorithms() {
    let identity = test_identity(12, "Heidi Example");
    for algorithm in [
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
    ] {
        let config = pinned_config().with_digest_algorithm(algorithm);
        let signed = PdfSigner::new(config)
            .sign(&one_page_pdf(), &identity.container, PASSWORD)
            .unwrap();
        let infos = verify(&signed).unwrap();
        assert_eq!(infos.len(), 1, "{} failed", algorithm);
    }
}

#[test]
fn test_require_full_chain_accepts_self_signed_leaf() {
    let identity = test_identity(13, "Ivy Example");
    let config = pinned_config().with_require_full_chain(true);
    assert!(PdfSigner::new(config)
        .sign(&one_page_pdf(), &identity.container, PASSWORD)
        .is_ok());
}

#[test]
fn test_sign_to_writes_complete_output() {
    let identity = test_identity(14, "Judy Example");
    let signer = PdfSigner::new(pinned_config());

    let mut sink = Vec::new();
    signer
        .sign_to(&one_page_pdf(), &identity.container, PASSWORD, &mut sink)
        .unwrap();
    assert_eq!(sink, signer.sign(&one_page_pdf(), &identity.container, PASSWORD).unwrap());
}

#[test]
fn test_sign_file_round_trip() {
    let identity = test_identity(15, "Ken Example");
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("plain.pdf");
    let output = dir.path().join("signed.pdf");
    std::fs::write(&input, one_page_pdf()).unwrap();

    PdfSigner::new(pinned_config())
        .sign_file(&input, &output, &identity.container, PASSWORD)
        .unwrap();

    let signed = std::fs::read(&output).unwrap();
    assert_eq!(verify(&signed).unwrap().len(), 1);
}

#[test]
fn test_unsigned_document_has_no_signatures() {
    assert!(matches!(
        verify(&one_page_pdf()),
        Err(Error::InvalidPdf(_))
    ));
}

#[test]
fn test_wrong_password_reaches_caller() {
    let identity = test_identity(16, "Leo Example");
    assert!(matches!(
        PdfSigner::new(pinned_config()).sign(&one_page_pdf(), &identity.container, "nope"),
        Err(Error::InvalidCredentials)
    ));
}
