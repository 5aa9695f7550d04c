//! Signer identity: private key, certificate chain, and subject names.
//!
//! [`Identity::load`] decrypts a PKCS#12 container and produces the one
//! value the rest of the pipeline consumes. The private key is owned
//! exclusively, scrubbed on drop, and never printed; the certificate chain
//! is reordered to leaf-first regardless of how the container stored it.

mod asn1;
mod pbe;
mod pkcs12;

pub use asn1::{tag, AlgorithmIdentifier, DerReader, Tlv};

use crate::error::{Error, Result};
use rsa::pkcs8::DecodePrivateKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use x509_parser::prelude::*;

const OID_RSA_ENCRYPTION: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];

/// A signer identity loaded from a password-protected container.
///
/// Holds the RSA private key, the certificate chain in leaf-first DER
/// form, and the leaf's subject/issuer attributes for the visible
/// annotation and the CMS `IssuerAndSerialNumber`.
pub struct Identity {
    key: RsaPrivateKey,
    /// DER certificates, leaf first.
    chain: Vec<Vec<u8>>,
    subject: Vec<(String, String)>,
    issuer: Vec<(String, String)>,
    /// Raw DER of the leaf's issuer Name, for IssuerAndSerialNumber.
    issuer_raw: Vec<u8>,
    /// Raw content bytes of the leaf's serial INTEGER.
    serial_raw: Vec<u8>,
    /// Leaf subject Name equals its issuer Name (self-signed).
    self_signed: bool,
}

impl Identity {
    /// Load an identity from PKCS#12 container bytes.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidCredentials`] — the password fails the container
    ///   MAC, or decryption yields invalid padding in a MAC-less container
    /// * [`Error::MalformedIdentity`] — no key, no certificate, a
    ///   key/certificate mismatch, or undecodable structure
    /// * [`Error::UnsupportedAlgorithm`] — non-RSA key, or a cipher/KDF
    ///   outside the supported set
    pub fn load(container: &[u8], password: &str) -> Result<Self> {
        let raw = pkcs12::parse(container, password)?;

        require_rsa_key(&raw.key_der)?;
        let key = RsaPrivateKey::from_pkcs8_der(&raw.key_der).map_err(|e| {
            Error::MalformedIdentity(format!("private key does not decode: {}", e))
        })?;

        let chain = order_chain(&key, raw.cert_ders)?;
        let (_, leaf) = X509Certificate::from_der(&chain[0])
            .map_err(|e| Error::MalformedIdentity(format!("leaf certificate: {}", e)))?;

        let subject = name_attributes(leaf.subject());
        let issuer = name_attributes(leaf.issuer());
        let issuer_raw = leaf.issuer().as_raw().to_vec();
        let serial_raw = leaf.tbs_certificate.raw_serial().to_vec();
        let self_signed = leaf.subject().as_raw() == leaf.issuer().as_raw();

        log::debug!(
            "identity loaded: CN={:?}, chain of {} certificate(s)",
            subject.iter().find(|(k, _)| k == "CN").map(|(_, v)| v.as_str()),
            chain.len()
        );

        Ok(Self { key, chain, subject, issuer, issuer_raw, serial_raw, self_signed })
    }

    /// The RSA private key handle.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.key
    }

    /// DER certificate chain, leaf first.
    pub fn chain_der(&self) -> &[Vec<u8>] {
        &self.chain
    }

    /// The leaf certificate in DER form.
    pub fn leaf_der(&self) -> &[u8] {
        &self.chain[0]
    }

    /// Subject attributes as (short name, value) pairs, in certificate
    /// order. Unrecognized attribute types were dropped at load time.
    pub fn subject_attributes(&self) -> &[(String, String)] {
        &self.subject
    }

    /// Issuer attributes as (short name, value) pairs.
    pub fn issuer_attributes(&self) -> &[(String, String)] {
        &self.issuer
    }

    /// The subject common name, when present.
    pub fn common_name(&self) -> Option<&str> {
        self.attribute("CN")
    }

    /// The subject country, when present.
    pub fn country(&self) -> Option<&str> {
        self.attribute("C")
    }

    fn attribute(&self, short: &str) -> Option<&str> {
        self.subject
            .iter()
            .find(|(k, _)| k == short)
            .map(|(_, v)| v.as_str())
    }

    /// Raw DER of the leaf's issuer Name.
    pub fn issuer_raw(&self) -> &[u8] {
        &self.issuer_raw
    }

    /// Raw content bytes of the leaf's serial number INTEGER.
    pub fn serial_raw(&self) -> &[u8] {
        &self.serial_raw
    }

    /// Whether the chain reaches a root: either more than one certificate
    /// is present, or the leaf itself is self-signed.
    pub fn has_full_chain(&self) -> bool {
        self.chain.len() > 1 || self.self_signed
    }
}

/// Key material never appears in Debug output.
impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("common_name", &self.common_name())
            .field("chain_len", &self.chain.len())
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Reject non-RSA keys up front with a clearer error than a decode failure.
fn require_rsa_key(pkcs8_der: &[u8]) -> Result<()> {
    // PrivateKeyInfo ::= SEQUENCE { version, privateKeyAlgorithm, ... }
    let mut reader = DerReader::new(pkcs8_der);
    let seq = reader.expect(tag::SEQUENCE)?;
    let mut inner = seq.reader();
    let _version = inner.expect_u64()?;
    let alg_seq = inner.expect(tag::SEQUENCE)?;
    let alg_oid = alg_seq.reader().expect_oid()?;
    if alg_oid != OID_RSA_ENCRYPTION {
        return Err(Error::UnsupportedAlgorithm(format!(
            "private key algorithm OID {} (only RSA is supported)",
            pbe::format_oid(alg_oid)
        )));
    }
    Ok(())
}

/// Reorder certificates leaf-first by issuer/subject linking.
///
/// The leaf is the certificate whose public key matches the private key;
/// its absence is a key/certificate mismatch. Certificates that do not
/// join the chain are dropped with a warning.
fn order_chain(key: &RsaPrivateKey, cert_ders: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>> {
    use rsa::pkcs1::DecodeRsaPublicKey;

    let expected = RsaPublicKey::from(key);
    let mut remaining: Vec<Vec<u8>> = cert_ders;

    let leaf_index = remaining
        .iter()
        .position(|der| {
            X509Certificate::from_der(der)
                .ok()
                .and_then(|(_, cert)| {
                    RsaPublicKey::from_pkcs1_der(&cert.public_key().subject_public_key.data).ok()
                })
                .is_some_and(|public| public == expected)
        })
        .ok_or_else(|| {
            Error::MalformedIdentity(
                "no certificate matches the private key".to_string(),
            )
        })?;

    let mut chain = vec![remaining.swap_remove(leaf_index)];

    // Walk issuer links: subject of the next certificate must equal the
    // issuer of the current tip.
    loop {
        let tip_issuer = {
            let (_, tip) = X509Certificate::from_der(chain.last().expect("chain is non-empty"))
                .map_err(|e| Error::MalformedIdentity(format!("certificate: {}", e)))?;
            if tip.subject().as_raw() == tip.issuer().as_raw() {
                break; // self-signed: the chain is complete
            }
            tip.issuer().as_raw().to_vec()
        };

        let next = remaining.iter().position(|der| {
            X509Certificate::from_der(der)
                .is_ok_and(|(_, cert)| cert.subject().as_raw() == tip_issuer)
        });
        match next {
            Some(index) => chain.push(remaining.swap_remove(index)),
            None => break,
        }
    }

    if !remaining.is_empty() {
        log::warn!(
            "{} certificate(s) in the container do not join the chain; dropped",
            remaining.len()
        );
    }
    Ok(chain)
}

/// Map a certificate Name to (short name, value) pairs, keeping only the
/// attribute types with a conventional short form.
fn name_attributes(name: &X509Name<'_>) -> Vec<(String, String)> {
    name.iter_attributes()
        .filter_map(|attr| {
            let short = short_attribute_name(&attr.attr_type().to_id_string())?;
            let value = attr.as_str().ok()?;
            Some((short.to_string(), value.to_string()))
        })
        .collect()
}

fn short_attribute_name(oid: &str) -> Option<&'static str> {
    match oid {
        "2.5.4.3" => Some("CN"),
        "2.5.4.6" => Some("C"),
        "2.5.4.7" => Some("L"),
        "2.5.4.8" => Some("ST"),
        "2.5.4.10" => Some("O"),
        "2.5.4.11" => Some("OU"),
        "1.2.840.113549.1.9.1" => Some("E"),
        _ => None,
    }
}
