//! PKCS#12 (PFX) container parsing.
//!
//! RFC 7292 structure: a PFX wraps an AuthenticatedSafe (a sequence of
//! plain or password-encrypted ContentInfos), each holding SafeBags; key
//! material lives in `keyBag`/`pkcs8ShroudedKeyBag`, certificates in
//! `certBag`. An optional MacData authenticates the whole safe with an
//! HMAC keyed from the same password.
//!
//! Error mapping follows the password/corruption distinction: a MAC
//! mismatch is `InvalidCredentials`; once the MAC has verified the
//! password, later decryption or padding failures are structural damage
//! and report `MalformedIdentity`.

use crate::error::{Error, Result};
use crate::identity::asn1::{self, tag, DerReader, Tlv};
use crate::identity::pbe;
use zeroize::Zeroizing;

const OID_ID_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01];
const OID_ID_ENCRYPTED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x06];
const OID_KEY_BAG: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x0C, 0x0A, 0x01, 0x01];
const OID_SHROUDED_KEY_BAG: &[u8] =
    &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x0C, 0x0A, 0x01, 0x02];
const OID_CERT_BAG: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x0C, 0x0A, 0x01, 0x03];
const OID_X509_CERTIFICATE: &[u8] =
    &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x16, 0x01];

/// Raw material pulled out of a container: one PKCS#8 PrivateKeyInfo and
/// the certificates, in the order the container stored them.
pub struct RawPfx {
    pub key_der: Zeroizing<Vec<u8>>,
    pub cert_ders: Vec<Vec<u8>>,
}

/// Decrypt and parse a PFX.
pub fn parse(container: &[u8], password: &str) -> Result<RawPfx> {
    let mut reader = DerReader::new(container);
    let pfx = reader
        .expect(tag::SEQUENCE)
        .map_err(|_| Error::MalformedIdentity("container is not a PFX".to_string()))?;
    let mut pfx_reader = pfx.reader();

    let version = pfx_reader.expect_u64()?;
    if version != 3 {
        return Err(Error::MalformedIdentity(format!(
            "PFX version {} (expected 3)",
            version
        )));
    }

    // authSafe ContentInfo must be id-data wrapping the AuthenticatedSafe
    let auth_safe_info = read_content_info(&mut pfx_reader)?;
    if auth_safe_info.content_type != OID_ID_DATA {
        return Err(Error::UnsupportedAlgorithm(format!(
            "authenticated safe content type OID {}",
            pbe::format_oid(auth_safe_info.content_type)
        )));
    }
    let auth_safe_bytes = octet_string_content(auth_safe_info.content)?;

    let mac_verified = match pfx_reader.take(tag::SEQUENCE)? {
        Some(mac_data) => {
            verify_mac(&mac_data, &auth_safe_bytes, password)?;
            true
        },
        None => {
            log::debug!("container carries no MacData; relying on PBE padding checks");
            false
        },
    };

    // AuthenticatedSafe ::= SEQUENCE OF ContentInfo
    let mut safe_reader = DerReader::new(&auth_safe_bytes);
    let safes = safe_reader.expect(tag::SEQUENCE)?;
    let mut safes_reader = safes.reader();

    let mut key_der: Option<Zeroizing<Vec<u8>>> = None;
    let mut cert_ders = Vec::new();

    while !safes_reader.is_empty() {
        let info = read_content_info(&mut safes_reader)?;
        let safe_contents: Zeroizing<Vec<u8>> = match info.content_type {
            OID_ID_DATA => Zeroizing::new(octet_string_content(info.content)?),
            OID_ID_ENCRYPTED_DATA => {
                Zeroizing::new(decrypt_encrypted_data(info.content, password, mac_verified)?)
            },
            other => {
                return Err(Error::UnsupportedAlgorithm(format!(
                    "authenticated-safe entry content type OID {}",
                    pbe::format_oid(other)
                )));
            },
        };
        collect_bags(&safe_contents, password, mac_verified, &mut key_der, &mut cert_ders)?;
    }

    let key_der = key_der.ok_or_else(|| {
        Error::MalformedIdentity("container holds no private key".to_string())
    })?;
    if cert_ders.is_empty() {
        return Err(Error::MalformedIdentity(
            "container holds no certificate".to_string(),
        ));
    }

    log::debug!(
        "parsed PFX: {} certificate(s), MAC {}",
        cert_ders.len(),
        if mac_verified { "verified" } else { "absent" }
    );
    Ok(RawPfx { key_der, cert_ders })
}

struct ContentInfo<'a> {
    content_type: &'a [u8],
    /// The [0] EXPLICIT content, still wrapped in its own TLV.
    content: &'a [u8],
}

/// ContentInfo ::= SEQUENCE { contentType OID, content [0] EXPLICIT ANY }
fn read_content_info<'a>(reader: &mut DerReader<'a>) -> Result<ContentInfo<'a>> {
    let seq = reader.expect(tag::SEQUENCE)?;
    let mut inner = seq.reader();
    let content_type = inner.expect_oid()?;
    let wrapper = inner.expect(tag::context(0))?;
    Ok(ContentInfo { content_type, content: wrapper.content })
}

/// Unwrap an OCTET STRING held inside a [0] EXPLICIT wrapper.
fn octet_string_content(wrapped: &[u8]) -> Result<Vec<u8>> {
    let mut reader = DerReader::new(wrapped);
    Ok(reader.expect(tag::OCTET_STRING)?.content.to_vec())
}

/// MacData ::= SEQUENCE { mac DigestInfo, macSalt OCTET STRING,
///                        iterations INTEGER DEFAULT 1 }
fn verify_mac(mac_data: &Tlv<'_>, auth_safe: &[u8], password: &str) -> Result<()> {
    let mut reader = mac_data.reader();

    let digest_info = reader.expect(tag::SEQUENCE)?;
    let mut di_reader = digest_info.reader();
    let alg = asn1::read_algorithm_identifier(&mut di_reader)?;
    let expected = di_reader.expect(tag::OCTET_STRING)?.content;

    let salt = reader.expect(tag::OCTET_STRING)?.content;
    let iterations = match reader.take(tag::INTEGER)? {
        Some(tlv) => DerReader::new(tlv.raw).expect_u64()?,
        None => 1,
    };

    let key = pbe::mac_key(alg.oid, password, salt, iterations)?;
    let computed = pbe::compute_mac(alg.oid, &key, auth_safe)?;
    if computed != expected {
        log::debug!("container MAC mismatch");
        return Err(Error::InvalidCredentials);
    }
    Ok(())
}

/// EncryptedData ::= SEQUENCE { version, encryptedContentInfo }
/// EncryptedContentInfo ::= SEQUENCE { contentType OID,
///   contentEncryptionAlgorithm AlgorithmIdentifier,
///   encryptedContent [0] IMPLICIT OCTET STRING OPTIONAL }
fn decrypt_encrypted_data(wrapped: &[u8], password: &str, mac_verified: bool) -> Result<Vec<u8>> {
    let mut reader = DerReader::new(wrapped);
    let seq = reader.expect(tag::SEQUENCE)?;
    let mut inner = seq.reader();
    let _version = inner.expect_u64()?;

    let eci = inner.expect(tag::SEQUENCE)?;
    let mut eci_reader = eci.reader();
    let content_type = eci_reader.expect_oid()?;
    if content_type != OID_ID_DATA {
        return Err(Error::MalformedIdentity(format!(
            "encrypted content type OID {}",
            pbe::format_oid(content_type)
        )));
    }
    let alg = asn1::read_algorithm_identifier(&mut eci_reader)?;

    // Primitive [0] is the DER form; a constructed [0] of octet-string
    // chunks appears in BER output from some producers.
    let ciphertext: Vec<u8> = match eci_reader.read()? {
        Tlv { tag: 0x80, content, .. } => content.to_vec(),
        Tlv { tag: 0xA0, content, .. } => {
            let mut chunks = DerReader::new(content);
            let mut joined = Vec::new();
            while !chunks.is_empty() {
                joined.extend_from_slice(chunks.expect(tag::OCTET_STRING)?.content);
            }
            joined
        },
        Tlv { tag, .. } => {
            return Err(Error::MalformedIdentity(format!(
                "unexpected tag 0x{:02X} for encrypted content",
                tag
            )));
        },
    };

    pbe::decrypt(&alg, password, &ciphertext).map_err(|e| after_mac(e, mac_verified))
}

/// SafeContents ::= SEQUENCE OF SafeBag; pull keys and certificates out of
/// every bag, skipping types the engine does not use.
fn collect_bags(
    safe_contents: &[u8],
    password: &str,
    mac_verified: bool,
    key_der: &mut Option<Zeroizing<Vec<u8>>>,
    cert_ders: &mut Vec<Vec<u8>>,
) -> Result<()> {
    let mut reader = DerReader::new(safe_contents);
    let seq = reader.expect(tag::SEQUENCE)?;
    let mut bags = seq.reader();

    while !bags.is_empty() {
        let bag = bags.expect(tag::SEQUENCE)?;
        let mut bag_reader = bag.reader();
        let bag_id = bag_reader.expect_oid()?;
        let value = bag_reader.expect(tag::context(0))?;
        // bagAttributes (friendlyName, localKeyId) are not needed

        match bag_id {
            OID_KEY_BAG => {
                let mut v = DerReader::new(value.content);
                let pki = v.expect(tag::SEQUENCE)?;
                store_key(key_der, Zeroizing::new(pki.raw.to_vec()));
            },
            OID_SHROUDED_KEY_BAG => {
                // EncryptedPrivateKeyInfo ::= SEQUENCE { alg, OCTET STRING }
                let mut v = DerReader::new(value.content);
                let epki = v.expect(tag::SEQUENCE)?;
                let mut epki_reader = epki.reader();
                let alg = asn1::read_algorithm_identifier(&mut epki_reader)?;
                let ciphertext = epki_reader.expect(tag::OCTET_STRING)?.content;
                let plain = pbe::decrypt(&alg, password, ciphertext)
                    .map_err(|e| after_mac(e, mac_verified))?;
                store_key(key_der, Zeroizing::new(plain));
            },
            OID_CERT_BAG => {
                // CertBag ::= SEQUENCE { certId OID, certValue [0] EXPLICIT }
                let mut v = DerReader::new(value.content);
                let cert_bag = v.expect(tag::SEQUENCE)?;
                let mut cb_reader = cert_bag.reader();
                let cert_id = cb_reader.expect_oid()?;
                let cert_value = cb_reader.expect(tag::context(0))?;
                if cert_id == OID_X509_CERTIFICATE {
                    let mut cv = DerReader::new(cert_value.content);
                    cert_ders.push(cv.expect(tag::OCTET_STRING)?.content.to_vec());
                } else {
                    log::warn!(
                        "skipping non-X.509 certificate bag (OID {})",
                        pbe::format_oid(cert_id)
                    );
                }
            },
            other => {
                log::debug!("skipping safe bag with OID {}", pbe::format_oid(other));
            },
        }
    }
    Ok(())
}

fn store_key(slot: &mut Option<Zeroizing<Vec<u8>>>, key: Zeroizing<Vec<u8>>) {
    if slot.is_some() {
        log::warn!("container holds more than one private key; keeping the first");
    } else {
        *slot = Some(key);
    }
}

/// After a verified MAC the password is known good, so a padding failure
/// in an inner decryption is damage, not a wrong password.
fn after_mac(err: Error, mac_verified: bool) -> Error {
    match err {
        Error::InvalidCredentials if mac_verified => Error::MalformedIdentity(
            "encrypted content is damaged despite a verified MAC".to_string(),
        ),
        other => other,
    }
}
