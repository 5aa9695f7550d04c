//! Verification of signed documents.
//!
//! Walks the interactive form for signature fields, recomputes the digest
//! over each signature's `/ByteRange`, and checks the RSA signature inside
//! the CMS container against the embedded signing certificate (or a caller
//! supplied one). This is the read-back counterpart of the signing path and
//! shares its byte-range math and DER tooling.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::identity::{tag, DerReader, Tlv};
use crate::object::Object;
use crate::signatures::byterange;
use crate::signatures::types::{DigestAlgorithm, SignatureInfo, SignatureSubFilter};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use x509_parser::prelude::*;

const OID_SIGNED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02];
const OID_MESSAGE_DIGEST: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x04];

/// Verify every signature in a signed document against its embedded
/// signing certificate.
///
/// Returns the metadata of each verified signature, in form-field order.
///
/// # Errors
///
/// * [`Error::InvalidPdf`] — no signature fields, or damaged structure
/// * [`Error::SigningFailed`] — a digest or signature mismatch
pub fn verify(signed: &[u8]) -> Result<Vec<SignatureInfo>> {
    verify_inner(signed, None)
}

/// Verify every signature against one expected signing certificate (DER).
///
/// Fails with [`Error::SigningFailed`] when any signature was produced by a
/// different certificate, even if it is internally consistent.
pub fn verify_against(signed: &[u8], cert_der: &[u8]) -> Result<Vec<SignatureInfo>> {
    verify_inner(signed, Some(cert_der))
}

fn verify_inner(signed: &[u8], expected_cert: Option<&[u8]>) -> Result<Vec<SignatureInfo>> {
    let document = Document::from_bytes(signed.to_vec())?;
    let fields = signature_fields(&document)?;
    if fields.is_empty() {
        return Err(Error::InvalidPdf(
            "document has no signature fields".to_string(),
        ));
    }

    let mut verified = Vec::with_capacity(fields.len());
    for (field_name, sig_dict) in fields {
        let info = verify_one(signed, &document, field_name, &sig_dict, expected_cert)?;
        verified.push(info);
    }
    log::debug!("verified {} signature(s)", verified.len());
    Ok(verified)
}

/// Collect `(field name, signature dictionary)` for every signed signature
/// field reachable from the form. Unsigned signature fields are skipped.
fn signature_fields(
    document: &Document,
) -> Result<Vec<(Option<String>, std::collections::HashMap<String, Object>)>> {
    let catalog = document.catalog_dict()?;
    let form = match document.resolved_entry(&catalog, "AcroForm")? {
        Some(form) => form
            .as_dict()
            .cloned()
            .ok_or_else(|| Error::InvalidPdf("/AcroForm is not a dictionary".to_string()))?,
        None => return Ok(Vec::new()),
    };
    let fields = match document.resolved_entry(&form, "Fields")? {
        Some(Object::Array(fields)) => fields,
        Some(_) => {
            return Err(Error::InvalidPdf("/AcroForm /Fields is not an array".to_string()));
        },
        None => return Ok(Vec::new()),
    };

    let mut out = Vec::new();
    for entry in &fields {
        let field = document
            .resolve(entry)?
            .as_dict()
            .cloned()
            .ok_or_else(|| Error::InvalidPdf("form field is not a dictionary".to_string()))?;
        if field.get("FT").and_then(Object::as_name) != Some("Sig") {
            continue;
        }
        let Some(value) = document.resolved_entry(&field, "V")? else {
            continue; // unsigned signature field
        };
        let sig_dict = value
            .as_dict()
            .cloned()
            .ok_or_else(|| Error::InvalidPdf("/V is not a signature dictionary".to_string()))?;
        let name = field
            .get("T")
            .and_then(|o| match o {
                Object::String(s) => Some(String::from_utf8_lossy(s).to_string()),
                _ => None,
            });
        out.push((name, sig_dict));
    }
    Ok(out)
}

fn verify_one(
    signed: &[u8],
    document: &Document,
    field_name: Option<String>,
    sig_dict: &std::collections::HashMap<String, Object>,
    expected_cert: Option<&[u8]>,
) -> Result<SignatureInfo> {
    let byte_range = read_byte_range(document, sig_dict)?;
    let contents = match document.resolved_entry(sig_dict, "Contents")? {
        Some(Object::String(bytes)) => bytes,
        _ => {
            return Err(Error::InvalidPdf(
                "signature dictionary has no /Contents string".to_string(),
            ));
        },
    };

    let ranges: Vec<(usize, usize)> = byte_range
        .chunks(2)
        .map(|pair| (pair[0] as usize, pair[1] as usize))
        .collect();
    let covered = byterange::extract_ranges(signed, &ranges)?;

    // The DER TLV carries its own length, so the zero padding appended to
    // fill the placeholder is ignored by the reader.
    let container = parse_container(&contents)?;

    let algorithm = DigestAlgorithm::from_oid(container.digest_oid).ok_or_else(|| {
        Error::UnsupportedAlgorithm(format!(
            "signature digest OID {:02X?}",
            container.digest_oid
        ))
    })?;
    let document_digest = algorithm.digest(&covered);
    if document_digest != container.message_digest {
        return Err(Error::SigningFailed(
            "document digest does not match the signed message-digest attribute".to_string(),
        ));
    }

    let signing_cert = find_signing_cert(&container)?;
    if let Some(expected) = expected_cert {
        if signing_cert != expected {
            return Err(Error::SigningFailed(
                "signature was not produced by the expected certificate".to_string(),
            ));
        }
    }

    check_rsa_signature(&container, signing_cert, algorithm)?;

    let mut info = SignatureInfo {
        field_name,
        byte_range: byte_range.clone(),
        ..SignatureInfo::default()
    };
    for (key, slot) in [
        ("Reason", &mut info.reason),
        ("Location", &mut info.location),
        ("ContactInfo", &mut info.contact_info),
        ("M", &mut info.signing_time),
        ("Name", &mut info.signer_name),
    ] {
        if let Some(Object::String(s)) = sig_dict.get(key) {
            *slot = Some(String::from_utf8_lossy(s).to_string());
        }
    }
    info.sub_filter = sig_dict
        .get("SubFilter")
        .and_then(Object::as_name)
        .and_then(SignatureSubFilter::from_pdf_name);
    Ok(info)
}

fn read_byte_range(
    document: &Document,
    sig_dict: &std::collections::HashMap<String, Object>,
) -> Result<Vec<i64>> {
    let array = match document.resolved_entry(sig_dict, "ByteRange")? {
        Some(Object::Array(array)) => array,
        _ => {
            return Err(Error::InvalidPdf(
                "signature dictionary has no /ByteRange array".to_string(),
            ));
        },
    };
    let values: Option<Vec<i64>> = array.iter().map(Object::as_integer).collect();
    let values = values
        .ok_or_else(|| Error::InvalidPdf("/ByteRange holds a non-integer".to_string()))?;
    if values.len() % 2 != 0 || values.is_empty() || values.iter().any(|&v| v < 0) {
        return Err(Error::InvalidPdf(format!("malformed /ByteRange {:?}", values)));
    }
    Ok(values)
}

/// The pieces of a parsed CMS container the checks need.
struct Container<'a> {
    digest_oid: &'a [u8],
    certificates: Vec<&'a [u8]>,
    issuer_raw: &'a [u8],
    serial_raw: &'a [u8],
    /// Signed attributes as stored (`[0] IMPLICIT` tag).
    signed_attrs_raw: &'a [u8],
    message_digest: &'a [u8],
    signature: &'a [u8],
}

fn parse_container(der: &[u8]) -> Result<Container<'_>> {
    let structural =
        |what: &str| Error::InvalidPdf(format!("signature container: {}", what));

    let mut reader = DerReader::new(der);
    let content_info = reader.expect(tag::SEQUENCE).map_err(|_| structural("not DER"))?;
    let mut ci = content_info.reader();
    if ci.expect_oid().map_err(|_| structural("missing content type"))? != OID_SIGNED_DATA {
        return Err(structural("content type is not signedData"));
    }
    let wrapper = ci.expect(tag::context(0)).map_err(|_| structural("missing content"))?;

    let mut sd = DerReader::new(wrapper.content);
    let signed_data = sd.expect(tag::SEQUENCE).map_err(|_| structural("bad SignedData"))?;
    let mut sd = signed_data.reader();
    let _version = sd.expect_u64().map_err(|_| structural("bad version"))?;

    let digest_algs = sd.expect(tag::SET).map_err(|_| structural("missing digest algorithms"))?;
    let digest_oid = {
        let mut set = digest_algs.reader();
        let alg = set.expect(tag::SEQUENCE).map_err(|_| structural("bad digest algorithm"))?;
        alg.reader().expect_oid().map_err(|_| structural("bad digest OID"))?
    };

    let _encap = sd.expect(tag::SEQUENCE).map_err(|_| structural("missing encapContentInfo"))?;

    let mut certificates = Vec::new();
    if let Some(certs) = sd.take(tag::context(0)).map_err(|_| structural("bad certificates"))? {
        let mut list = certs.reader();
        while !list.is_empty() {
            let cert = list.read().map_err(|_| structural("bad certificate entry"))?;
            certificates.push(cert.raw);
        }
    }
    let _crls = sd.take(tag::context(1)).map_err(|_| structural("bad crls"))?;

    let signer_infos = sd.expect(tag::SET).map_err(|_| structural("missing signerInfos"))?;
    let signer_info = signer_infos
        .reader()
        .expect(tag::SEQUENCE)
        .map_err(|_| structural("missing SignerInfo"))?;
    let mut si = signer_info.reader();
    let _version = si.expect_u64().map_err(|_| structural("bad SignerInfo version"))?;

    let issuer_and_serial = si.expect(tag::SEQUENCE).map_err(|_| structural("bad issuer"))?;
    let (issuer_raw, serial_raw) = {
        let mut ias = issuer_and_serial.reader();
        let issuer = ias.read().map_err(|_| structural("bad issuer name"))?;
        let serial = ias.expect(tag::INTEGER).map_err(|_| structural("bad serial"))?;
        (issuer.raw, serial.content)
    };

    let _digest_alg = si.expect(tag::SEQUENCE).map_err(|_| structural("bad digest algorithm"))?;
    let signed_attrs = si
        .expect(tag::context(0))
        .map_err(|_| structural("missing signed attributes"))?;
    let message_digest = find_message_digest(&signed_attrs)
        .ok_or_else(|| structural("missing message-digest attribute"))?;
    let _sig_alg = si.expect(tag::SEQUENCE).map_err(|_| structural("bad signature algorithm"))?;
    let signature = si
        .expect(tag::OCTET_STRING)
        .map_err(|_| structural("missing signature value"))?
        .content;

    Ok(Container {
        digest_oid,
        certificates,
        issuer_raw,
        serial_raw,
        signed_attrs_raw: signed_attrs.raw,
        message_digest,
        signature,
    })
}

/// Pull the message-digest attribute value out of the signed attributes.
fn find_message_digest<'a>(signed_attrs: &Tlv<'a>) -> Option<&'a [u8]> {
    let mut attrs = signed_attrs.reader();
    while !attrs.is_empty() {
        let attr = attrs.read().ok()?;
        let mut inner = attr.reader();
        let oid = inner.expect_oid().ok()?;
        if oid == OID_MESSAGE_DIGEST {
            let values = inner.expect(tag::SET).ok()?;
            return Some(values.reader().expect(tag::OCTET_STRING).ok()?.content);
        }
    }
    None
}

/// The certificate matching the SignerInfo's IssuerAndSerialNumber.
fn find_signing_cert<'a>(container: &Container<'a>) -> Result<&'a [u8]> {
    for der in &container.certificates {
        let Ok((_, cert)) = X509Certificate::from_der(der) else {
            continue;
        };
        if cert.issuer().as_raw() == container.issuer_raw
            && cert.tbs_certificate.raw_serial() == container.serial_raw
        {
            return Ok(der);
        }
    }
    Err(Error::InvalidPdf(
        "signature container names a certificate it does not carry".to_string(),
    ))
}

/// Check the RSA PKCS#1 v1.5 signature over the signed attributes.
///
/// The attributes are stored `[0] IMPLICIT` but were signed in their
/// explicit `SET OF` form, so the tag is rewritten before hashing.
fn check_rsa_signature(
    container: &Container<'_>,
    cert_der: &[u8],
    algorithm: DigestAlgorithm,
) -> Result<()> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| Error::InvalidPdf(format!("signing certificate: {}", e)))?;
    let public = RsaPublicKey::from_pkcs1_der(&cert.public_key().subject_public_key.data)
        .map_err(|e| Error::UnsupportedAlgorithm(format!("signing key is not RSA: {}", e)))?;

    let mut set_form = container.signed_attrs_raw.to_vec();
    set_form[0] = 0x31;
    let attrs_digest = algorithm.digest(&set_form);

    let padding = match algorithm {
        DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    };
    public
        .verify(padding, &attrs_digest, container.signature)
        .map_err(|_| Error::SigningFailed("RSA signature verification failed".to_string()))
}
