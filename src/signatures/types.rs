//! Shared signature types: digest algorithms and signature dictionary names.
//!
//! ISO 32000-1:2008 Section 12.8.3 defines the interoperable signature
//! handlers and their `/SubFilter` names; RFC 5652 and FIPS 180-4 define the
//! digest algorithms carried inside the CMS container.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::str::FromStr;

/// Digest algorithm used for both the document hash and the CMS signature.
///
/// The same algorithm hashes the byte ranges of the document and drives the
/// RSA PKCS#1 v1.5 signature inside the container, so a single choice here
/// keeps the two consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-1. Legacy; accepted for interoperability with older validators.
    #[serde(rename = "SHA-1")]
    Sha1,
    /// SHA-256, the default.
    #[default]
    #[serde(rename = "SHA-256")]
    Sha256,
    /// SHA-384.
    #[serde(rename = "SHA-384")]
    Sha384,
    /// SHA-512.
    #[serde(rename = "SHA-512")]
    Sha512,
}

impl DigestAlgorithm {
    /// DER content bytes of the algorithm OID (tag and length not included).
    pub fn oid(&self) -> &'static [u8] {
        match self {
            // 1.3.14.3.2.26
            DigestAlgorithm::Sha1 => &[0x2B, 0x0E, 0x03, 0x02, 0x1A],
            // 2.16.840.1.101.3.4.2.1
            DigestAlgorithm::Sha256 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01],
            // 2.16.840.1.101.3.4.2.2
            DigestAlgorithm::Sha384 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02],
            // 2.16.840.1.101.3.4.2.3
            DigestAlgorithm::Sha512 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03],
        }
    }

    /// Recognize an algorithm from DER OID content bytes.
    pub fn from_oid(oid: &[u8]) -> Option<Self> {
        [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ]
        .into_iter()
        .find(|algorithm| algorithm.oid() == oid)
    }

    /// Canonical name, as accepted by [`FromStr`] and emitted by `Display`.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Digest output length in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// Hash a series of spans as one message.
    ///
    /// The signed portion of a document is two discontiguous ranges; feeding
    /// them through one hasher avoids concatenating multi-megabyte inputs.
    pub fn digest_spans(&self, spans: &[&[u8]]) -> Vec<u8> {
        fn run<D: Digest>(spans: &[&[u8]]) -> Vec<u8> {
            let mut hasher = D::new();
            for span in spans {
                hasher.update(span);
            }
            hasher.finalize().to_vec()
        }
        match self {
            DigestAlgorithm::Sha1 => run::<Sha1>(spans),
            DigestAlgorithm::Sha256 => run::<Sha256>(spans),
            DigestAlgorithm::Sha384 => run::<Sha384>(spans),
            DigestAlgorithm::Sha512 => run::<Sha512>(spans),
        }
    }

    /// Hash a single contiguous message.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        self.digest_spans(&[data])
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = Error;

    /// Parses "SHA-256", "sha256", "SHA 384" and similar spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "SHA1" => Ok(DigestAlgorithm::Sha1),
            "SHA256" => Ok(DigestAlgorithm::Sha256),
            "SHA384" => Ok(DigestAlgorithm::Sha384),
            "SHA512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(Error::UnsupportedAlgorithm(format!(
                "unknown digest algorithm: {s}"
            ))),
        }
    }
}

/// Signature handler encoding named by `/SubFilter` (ISO 32000-1 Table 252).
///
/// Signing always emits `adbe.pkcs7.detached`; the other names are recognized
/// when reading back a signed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignatureSubFilter {
    /// PKCS#7 detached signature (`adbe.pkcs7.detached`).
    #[default]
    Pkcs7Detached,
    /// PKCS#7 with SHA-1 digest of the document embedded (`adbe.pkcs7.sha1`).
    Pkcs7Sha1,
    /// PAdES CAdES detached signature (`ETSI.CAdES.detached`).
    CadesDetached,
}

impl SignatureSubFilter {
    /// The `/SubFilter` name value.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            SignatureSubFilter::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureSubFilter::Pkcs7Sha1 => "adbe.pkcs7.sha1",
            SignatureSubFilter::CadesDetached => "ETSI.CAdES.detached",
        }
    }

    /// Recognize a `/SubFilter` name from a parsed dictionary.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.detached" => Some(SignatureSubFilter::Pkcs7Detached),
            "adbe.pkcs7.sha1" => Some(SignatureSubFilter::Pkcs7Sha1),
            "ETSI.CAdES.detached" => Some(SignatureSubFilter::CadesDetached),
            _ => None,
        }
    }
}

/// Metadata extracted from a signature dictionary in a signed document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignatureInfo {
    /// `/T` of the widget the signature dictionary hangs off, when known.
    pub field_name: Option<String>,
    /// `/Name` entry.
    pub signer_name: Option<String>,
    /// `/Reason` entry.
    pub reason: Option<String>,
    /// `/Location` entry.
    pub location: Option<String>,
    /// `/ContactInfo` entry.
    pub contact_info: Option<String>,
    /// `/M` entry, as the raw PDF date string.
    pub signing_time: Option<String>,
    /// `/SubFilter`, when it names a known handler encoding.
    pub sub_filter: Option<SignatureSubFilter>,
    /// `/ByteRange` pairs as stored.
    pub byte_range: Vec<i64>,
}
