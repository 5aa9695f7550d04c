//! CMS/PKCS#7 `SignedData` construction.
//!
//! Builds the detached signature container embedded in `/Contents`: RFC 5652
//! `SignedData` wrapped in a `ContentInfo`, with the certificate chain and a
//! single RSA `SignerInfo`. The ASN.1 is written explicitly, tag by tag, so
//! the byte layout is reproducible and the `SET OF` ordering contract is
//! testable.
//!
//! The signature is computed over the DER of the signed attributes in their
//! explicit `SET OF` form (RFC 5652 §5.4) — not over the raw document
//! digest. Inside `SignerInfo` the same attributes appear re-tagged as
//! `[0] IMPLICIT`.

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::signatures::types::DigestAlgorithm;
use chrono::{DateTime, Utc};
use rsa::Pkcs1v15Sign;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

const OID_SIGNED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02];
const OID_ID_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01];
const OID_CONTENT_TYPE: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x03];
const OID_MESSAGE_DIGEST: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x04];
const OID_SIGNING_TIME: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x05];
const OID_RSA_ENCRYPTION: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];

/// Build the detached `SignedData` container over a document digest.
///
/// `digest` is the hash of the covered byte ranges; `signing_time` must be
/// the same instant written to the dictionary `/M` entry.
pub fn build_signed_data(
    digest: &[u8],
    identity: &Identity,
    algorithm: DigestAlgorithm,
    signing_time: DateTime<Utc>,
) -> Result<Vec<u8>> {
    let digest_alg = algorithm_identifier(algorithm.oid());

    // encapContentInfo: id-data with no eContent (detached)
    let encap = build_sequence(&[build_oid(OID_ID_DATA)]);

    // certificates [0] IMPLICIT, leaf first
    let mut cert_bytes = Vec::new();
    for der in identity.chain_der() {
        cert_bytes.extend_from_slice(der);
    }
    let certificates = build_tlv(0xA0, &cert_bytes);

    let signed_attrs = build_signed_attributes(digest, signing_time);
    let signature = sign_attributes(&signed_attrs, identity, algorithm)?;

    // Same attributes, re-tagged [0] IMPLICIT inside SignerInfo
    let mut implicit_attrs = signed_attrs.clone();
    implicit_attrs[0] = 0xA0;

    let issuer_and_serial = build_sequence(&[
        identity.issuer_raw().to_vec(),
        build_tlv(0x02, identity.serial_raw()),
    ]);

    let signer_info = build_sequence(&[
        build_integer(1),
        issuer_and_serial,
        digest_alg.clone(),
        implicit_attrs,
        algorithm_identifier(OID_RSA_ENCRYPTION),
        build_tlv(0x04, &signature),
    ]);

    let signed_data = build_sequence(&[
        build_integer(1),
        build_tlv(0x31, &digest_alg),
        encap,
        certificates,
        build_tlv(0x31, &signer_info),
    ]);

    let container = build_sequence(&[
        build_oid(OID_SIGNED_DATA),
        build_tlv(0xA0, &signed_data),
    ]);

    log::debug!(
        "built {} byte CMS container ({} certificate(s), {})",
        container.len(),
        identity.chain_der().len(),
        algorithm
    );
    Ok(container)
}

/// The signed attributes in their explicit `SET OF` form (tag 0x31).
///
/// Attribute elements are sorted by their encoded bytes, the DER `SET OF`
/// order a validator will re-derive when it checks the signature.
fn build_signed_attributes(digest: &[u8], signing_time: DateTime<Utc>) -> Vec<u8> {
    let mut attrs = vec![
        build_attribute(OID_CONTENT_TYPE, build_oid(OID_ID_DATA)),
        build_attribute(OID_SIGNING_TIME, build_utc_time(signing_time)),
        build_attribute(OID_MESSAGE_DIGEST, build_tlv(0x04, digest)),
    ];
    attrs.sort();
    build_tlv(0x31, &attrs.concat())
}

/// Attribute ::= SEQUENCE { attrType OID, attrValues SET OF AttributeValue }
fn build_attribute(oid: &[u8], value: Vec<u8>) -> Vec<u8> {
    build_sequence(&[build_oid(oid), build_tlv(0x31, &value)])
}

/// PKCS#1 v1.5 signature over the `SET OF` DER of the signed attributes.
fn sign_attributes(
    signed_attrs: &[u8],
    identity: &Identity,
    algorithm: DigestAlgorithm,
) -> Result<Vec<u8>> {
    let attrs_digest = algorithm.digest(signed_attrs);
    let padding = match algorithm {
        DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    };
    identity
        .private_key()
        .sign(padding, &attrs_digest)
        .map_err(|e| Error::SigningFailed(format!("RSA signature: {}", e)))
}

/// AlgorithmIdentifier with NULL parameters.
fn algorithm_identifier(oid: &[u8]) -> Vec<u8> {
    build_sequence(&[build_oid(oid), vec![0x05, 0x00]])
}

fn build_oid(content: &[u8]) -> Vec<u8> {
    build_tlv(0x06, content)
}

/// Small non-negative INTEGER.
fn build_integer(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    let mut content = bytes[skip..].to_vec();
    if content[0] & 0x80 != 0 {
        content.insert(0, 0);
    }
    build_tlv(0x02, &content)
}

/// UTCTime in the `YYMMDDHHMMSSZ` form RFC 5652 requires.
fn build_utc_time(time: DateTime<Utc>) -> Vec<u8> {
    let formatted = time.format("%y%m%d%H%M%SZ").to_string();
    build_tlv(0x17, formatted.as_bytes())
}

fn build_sequence(parts: &[Vec<u8>]) -> Vec<u8> {
    build_tlv(0x30, &parts.concat())
}

/// Encode one tag-length-value element with a definite DER length.
pub(crate) fn build_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 5);
    out.push(tag);
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(content);
    out
}
