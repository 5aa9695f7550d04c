//! Shared fixtures: minimal PDF documents and generated PKCS#12 identities.
//!
//! Identities are built from scratch so the tests depend on no binary
//! fixture files: a seeded RSA key, a self-signed certificate assembled as
//! raw DER, and a PFX container carrying both with an HMAC-SHA256 MacData.

#![allow(dead_code)]

use hmac::{Hmac, Mac};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::pkcs8::EncodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest, Sha256};

pub const PASSWORD: &str = "test-password";

// ---------------------------------------------------------------- PDF side

/// Builds a minimal classic-xref PDF, tracking object offsets.
pub struct MiniPdf {
    buf: Vec<u8>,
    offsets: Vec<(u32, usize)>,
}

impl MiniPdf {
    pub fn new() -> Self {
        Self {
            buf: b"%PDF-1.4\n".to_vec(),
            offsets: Vec::new(),
        }
    }

    pub fn add_object(&mut self, number: u32, body: &str) {
        self.offsets.push((number, self.buf.len()));
        self.buf
            .extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", number, body).as_bytes());
    }

    pub fn finish(mut self, root: u32) -> Vec<u8> {
        self.offsets.sort_by_key(|&(n, _)| n);
        let size = self.offsets.last().map(|&(n, _)| n + 1).unwrap_or(1);
        let xref_offset = self.buf.len();

        self.buf
            .extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", size).as_bytes());
        for &(_, offset) in &self.offsets {
            self.buf
                .extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        self.buf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root {} 0 R >>\nstartxref\n{}\n%%EOF\n",
                size, root, xref_offset
            )
            .as_bytes(),
        );
        self.buf
    }
}

pub fn one_page_pdf() -> Vec<u8> {
    let mut pdf = MiniPdf::new();
    pdf.add_object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    pdf.add_object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    pdf.add_object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>");
    pdf.finish(1)
}

pub fn two_page_pdf() -> Vec<u8> {
    let mut pdf = MiniPdf::new();
    pdf.add_object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    pdf.add_object(2, "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>");
    pdf.add_object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>");
    pdf.add_object(4, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>");
    pdf.finish(1)
}

// ----------------------------------------------------------- identity side

const OID_RSA_ENCRYPTION: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];
const OID_SHA256_WITH_RSA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B];
const OID_ID_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01];
const OID_KEY_BAG: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x0C, 0x0A, 0x01, 0x01];
const OID_CERT_BAG: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x0C, 0x0A, 0x01, 0x03];
const OID_X509_CERTIFICATE: &[u8] =
    &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x16, 0x01];
const OID_SHA256: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];
const OID_CN: &[u8] = &[0x55, 0x04, 0x03];

/// A complete test identity: PFX container, its certificate, its key.
pub struct TestIdentity {
    pub container: Vec<u8>,
    pub cert_der: Vec<u8>,
    pub key: RsaPrivateKey,
}

/// Generate an identity deterministically from a seed.
///
/// 1024-bit keys keep generation fast; the engine itself never minds the
/// modulus size.
pub fn test_identity(seed: u64, common_name: &str) -> TestIdentity {
    let mut rng = StdRng::seed_from_u64(seed);
    let key = RsaPrivateKey::new(&mut rng, 1024).expect("RSA key generation");
    let cert_der = self_signed_cert(&key, common_name, seed);
    let container = build_pfx(&key, &cert_der, PASSWORD);
    TestIdentity { container, cert_der, key }
}

// DER construction helpers

pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
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

pub fn seq(parts: &[Vec<u8>]) -> Vec<u8> {
    tlv(0x30, &parts.concat())
}

fn alg(oid: &[u8]) -> Vec<u8> {
    seq(&[tlv(0x06, oid), vec![0x05, 0x00]])
}

fn bit_string(data: &[u8]) -> Vec<u8> {
    let mut content = vec![0x00];
    content.extend_from_slice(data);
    tlv(0x03, &content)
}

fn rdn_name(common_name: &str) -> Vec<u8> {
    let attr = seq(&[tlv(0x06, OID_CN), tlv(0x0C, common_name.as_bytes())]);
    seq(&[tlv(0x31, &attr)])
}

fn self_signed_cert(key: &RsaPrivateKey, common_name: &str, seed: u64) -> Vec<u8> {
    let public_der = key
        .to_public_key()
        .to_pkcs1_der()
        .expect("public key encoding");
    let spki = seq(&[alg(OID_RSA_ENCRYPTION), bit_string(public_der.as_bytes())]);

    let serial = tlv(0x02, &[((seed as u8) & 0x7F) | 1]);
    let validity = seq(&[
        tlv(0x17, b"260101000000Z"),
        tlv(0x17, b"360101000000Z"),
    ]);

    let tbs = seq(&[
        tlv(0xA0, &tlv(0x02, &[0x02])), // version v3
        serial,
        alg(OID_SHA256_WITH_RSA),
        rdn_name(common_name),
        validity,
        rdn_name(common_name),
        spki,
    ]);

    let digest = Sha256::digest(&tbs);
    let signature = key
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .expect("certificate self-signature");

    seq(&[tbs, alg(OID_SHA256_WITH_RSA), bit_string(&signature)])
}

/// Assemble a PFX: plain keyBag + certBag inside one id-data safe, with a
/// MacData authenticating the whole AuthenticatedSafe via HMAC-SHA256.
pub fn build_pfx(key: &RsaPrivateKey, cert_der: &[u8], password: &str) -> Vec<u8> {
    let key_der = key.to_pkcs8_der().expect("PKCS#8 encoding");

    let key_bag = seq(&[
        tlv(0x06, OID_KEY_BAG),
        tlv(0xA0, key_der.as_bytes()),
    ]);
    let cert_bag_value = seq(&[
        tlv(0x06, OID_X509_CERTIFICATE),
        tlv(0xA0, &tlv(0x04, cert_der)),
    ]);
    let cert_bag = seq(&[tlv(0x06, OID_CERT_BAG), tlv(0xA0, &cert_bag_value)]);

    let safe_contents = seq(&[key_bag, cert_bag]);
    let content_info = seq(&[
        tlv(0x06, OID_ID_DATA),
        tlv(0xA0, &tlv(0x04, &safe_contents)),
    ]);
    let auth_safe = seq(&[content_info]);

    let salt = [0x5A; 8];
    let iterations: u32 = 2048;
    let mac_key = pkcs12_mac_key_sha256(password, &salt, u64::from(iterations));
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&mac_key).expect("HMAC key");
    mac.update(&auth_safe);
    let mac_value = mac.finalize().into_bytes();

    let digest_info = seq(&[alg(OID_SHA256), tlv(0x04, &mac_value)]);
    let mac_data = seq(&[
        digest_info,
        tlv(0x04, &salt),
        tlv(0x02, &iterations.to_be_bytes()[2..]),
    ]);

    seq(&[
        tlv(0x02, &[0x03]), // PFX version 3
        seq(&[tlv(0x06, OID_ID_DATA), tlv(0xA0, &tlv(0x04, &auth_safe))]),
        mac_data,
    ])
}

/// RFC 7292 appendix B KDF, SHA-256, MAC purpose (ID 3), one output block.
///
/// A 32-byte output equals one digest, so the block-update half of the
/// algorithm never runs.
fn pkcs12_mac_key_sha256(password: &str, salt: &[u8], iterations: u64) -> Vec<u8> {
    const V: usize = 64;

    let mut bmp: Vec<u8> = Vec::new();
    for unit in password.encode_utf16() {
        bmp.extend_from_slice(&unit.to_be_bytes());
    }
    bmp.extend_from_slice(&[0, 0]);

    let repeat_to_block = |data: &[u8]| -> Vec<u8> {
        if data.is_empty() {
            return Vec::new();
        }
        let len = V * data.len().div_ceil(V);
        (0..len).map(|i| data[i % data.len()]).collect()
    };

    let mut hasher = Sha256::new();
    hasher.update([3u8; V]);
    hasher.update(repeat_to_block(salt));
    hasher.update(repeat_to_block(&bmp));
    let mut a = hasher.finalize().to_vec();
    for _ in 1..iterations {
        a = Sha256::digest(&a).to_vec();
    }
    a
}
