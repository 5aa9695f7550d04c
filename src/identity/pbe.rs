//! Password-based encryption for PKCS#12 containers.
//!
//! Two generations of scheme appear in real containers and both are
//! supported: PBES2 (RFC 8018: PBKDF2 with an HMAC PRF, then AES-CBC or
//! three-key 3DES-CBC) as produced by modern OpenSSL, and the legacy
//! PKCS#12 PBE schemes (RFC 7292 Appendix C: the Appendix B KDF with SHA-1,
//! then 3DES-CBC or 40-bit RC2-CBC) still emitted by older tooling and some
//! national CAs.
//!
//! A padding failure after decryption is reported as [`Error::InvalidCredentials`]:
//! with CBC and PKCS#7 padding, a wrong password and corrupted ciphertext
//! are indistinguishable.

use crate::error::{Error, Result};
use crate::identity::asn1::{self, tag, AlgorithmIdentifier, DerReader};
use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, InnerIvInit, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use des::TdesEde3;
use hmac::Hmac;
use rc2::Rc2;
use sha1::{Digest, Sha1};
use sha2::digest::FixedOutputReset;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use zeroize::{Zeroize, Zeroizing};

// PBES2 family (RFC 8018)
pub const OID_PBES2: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x05, 0x0D];
const OID_PBKDF2: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x05, 0x0C];
const OID_HMAC_SHA1: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x02, 0x07];
const OID_HMAC_SHA224: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x02, 0x08];
const OID_HMAC_SHA256: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x02, 0x09];
const OID_HMAC_SHA384: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x02, 0x0A];
const OID_HMAC_SHA512: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x02, 0x0B];
const OID_AES128_CBC: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x01, 0x02];
const OID_AES192_CBC: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x01, 0x16];
const OID_AES256_CBC: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x01, 0x2A];
const OID_DES_EDE3_CBC: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x03, 0x07];

// Legacy PKCS#12 PBE (RFC 7292 Appendix C)
pub const OID_PBE_SHA1_3DES: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x0C, 0x01, 0x03];
pub const OID_PBE_SHA1_RC2_40: &[u8] =
    &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x0C, 0x01, 0x06];

// Digests accepted for MacData
pub const OID_SHA1: &[u8] = &[0x2B, 0x0E, 0x03, 0x02, 0x1A];
pub const OID_SHA256: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];

/// Purpose byte for the RFC 7292 Appendix B KDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPurpose {
    /// Encryption key material (ID = 1)
    Key = 1,
    /// Initialization vector (ID = 2)
    Iv = 2,
    /// MAC key (ID = 3)
    Mac = 3,
}

/// Decrypt `data` according to a PBE AlgorithmIdentifier.
///
/// Dispatches on the scheme OID: PBES2 or one of the two legacy PKCS#12
/// schemes. Unknown schemes are [`Error::UnsupportedAlgorithm`].
pub fn decrypt(alg: &AlgorithmIdentifier<'_>, password: &str, data: &[u8]) -> Result<Vec<u8>> {
    match alg.oid {
        OID_PBES2 => decrypt_pbes2(alg.params, password, data),
        OID_PBE_SHA1_3DES => {
            let (salt, iterations) = read_pkcs12_pbe_params(alg.params)?;
            let key = derive_pkcs12::<Sha1>(password, &salt, KeyPurpose::Key, iterations, 24);
            let iv = derive_pkcs12::<Sha1>(password, &salt, KeyPurpose::Iv, iterations, 8);
            cbc_decrypt_unpad::<TdesEde3>(
                cbc::Decryptor::<TdesEde3>::new_from_slices(&key, &iv)
                    .map_err(|_| bad_cipher_setup("3DES"))?,
                data,
                8,
            )
        },
        OID_PBE_SHA1_RC2_40 => {
            let (salt, iterations) = read_pkcs12_pbe_params(alg.params)?;
            let key = derive_pkcs12::<Sha1>(password, &salt, KeyPurpose::Key, iterations, 5);
            let iv = derive_pkcs12::<Sha1>(password, &salt, KeyPurpose::Iv, iterations, 8);
            if iv.len() != 8 {
                return Err(bad_cipher_setup("RC2"));
            }
            let cipher = Rc2::new_with_eff_key_len(&key, 40);
            let dec = cbc::Decryptor::<Rc2>::inner_iv_slice_init(cipher, &iv)
                .map_err(|_| bad_cipher_setup("RC2"))?;
            cbc_decrypt_unpad::<Rc2>(dec, data, 8)
        },
        other => Err(Error::UnsupportedAlgorithm(format!(
            "PBE scheme OID {}",
            format_oid(other)
        ))),
    }
}

/// Derive the HMAC key for MacData verification (RFC 7292 Appendix B, ID 3).
///
/// `digest_oid` is the DigestInfo algorithm; SHA-1 and SHA-256 are the forms
/// seen in the wild.
pub fn mac_key(digest_oid: &[u8], password: &str, salt: &[u8], iterations: u64) -> Result<Zeroizing<Vec<u8>>> {
    match digest_oid {
        OID_SHA1 => Ok(derive_pkcs12::<Sha1>(password, salt, KeyPurpose::Mac, iterations, 20)),
        OID_SHA256 => Ok(derive_pkcs12::<Sha256>(password, salt, KeyPurpose::Mac, iterations, 32)),
        other => Err(Error::UnsupportedAlgorithm(format!(
            "MAC digest OID {}",
            format_oid(other)
        ))),
    }
}

/// Compute the MacData HMAC over the authenticated-safe content.
pub fn compute_mac(digest_oid: &[u8], key: &[u8], content: &[u8]) -> Result<Vec<u8>> {
    use hmac::Mac;
    match digest_oid {
        OID_SHA1 => {
            let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(key)
                .map_err(|_| bad_cipher_setup("HMAC-SHA1"))?;
            mac.update(content);
            Ok(mac.finalize().into_bytes().to_vec())
        },
        OID_SHA256 => {
            let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
                .map_err(|_| bad_cipher_setup("HMAC-SHA256"))?;
            mac.update(content);
            Ok(mac.finalize().into_bytes().to_vec())
        },
        other => Err(Error::UnsupportedAlgorithm(format!(
            "MAC digest OID {}",
            format_oid(other)
        ))),
    }
}

fn decrypt_pbes2(params: &[u8], password: &str, data: &[u8]) -> Result<Vec<u8>> {
    // PBES2-params ::= SEQUENCE { keyDerivationFunc, encryptionScheme }
    let mut reader = DerReader::new(params);
    let seq = reader.expect(tag::SEQUENCE)?;
    let mut inner = seq.reader();
    let kdf = asn1::read_algorithm_identifier(&mut inner)?;
    let scheme = asn1::read_algorithm_identifier(&mut inner)?;

    if kdf.oid != OID_PBKDF2 {
        return Err(Error::UnsupportedAlgorithm(format!(
            "PBES2 key derivation OID {}",
            format_oid(kdf.oid)
        )));
    }

    // PBKDF2-params ::= SEQUENCE { salt, iterationCount,
    //                              keyLength OPTIONAL, prf DEFAULT hmacSHA1 }
    let mut kdf_reader = DerReader::new(kdf.params);
    let kdf_seq = kdf_reader.expect(tag::SEQUENCE)?;
    let mut kdf_inner = kdf_seq.reader();
    let salt = kdf_inner.expect(tag::OCTET_STRING)?.content;
    let iterations = kdf_inner.expect_u64()?;
    let _declared_key_len = match kdf_inner.peek_tag() {
        Some(tag::INTEGER) => Some(kdf_inner.expect_u64()?),
        _ => None,
    };
    let prf_oid = match kdf_inner.take(tag::SEQUENCE)? {
        Some(prf_seq) => prf_seq.reader().expect_oid()?,
        None => OID_HMAC_SHA1,
    };

    let (key_len, block_len) = match scheme.oid {
        OID_AES128_CBC => (16usize, 16usize),
        OID_AES192_CBC => (24, 16),
        OID_AES256_CBC => (32, 16),
        OID_DES_EDE3_CBC => (24, 8),
        other => {
            return Err(Error::UnsupportedAlgorithm(format!(
                "PBES2 cipher OID {}",
                format_oid(other)
            )));
        },
    };

    let mut scheme_reader = DerReader::new(scheme.params);
    let iv = scheme_reader.expect(tag::OCTET_STRING)?.content;
    if iv.len() != block_len {
        return Err(Error::MalformedIdentity(format!(
            "PBES2 IV is {} bytes, cipher block is {}",
            iv.len(),
            block_len
        )));
    }

    let iterations = u32::try_from(iterations)
        .map_err(|_| Error::MalformedIdentity("PBKDF2 iteration count overflows".to_string()))?;
    let key = derive_pbkdf2(prf_oid, password, salt, iterations, key_len)?;

    match scheme.oid {
        OID_AES128_CBC => cbc_decrypt_unpad::<Aes128>(
            cbc::Decryptor::<Aes128>::new_from_slices(&key, iv)
                .map_err(|_| bad_cipher_setup("AES-128"))?,
            data,
            16,
        ),
        OID_AES192_CBC => cbc_decrypt_unpad::<Aes192>(
            cbc::Decryptor::<Aes192>::new_from_slices(&key, iv)
                .map_err(|_| bad_cipher_setup("AES-192"))?,
            data,
            16,
        ),
        OID_AES256_CBC => cbc_decrypt_unpad::<Aes256>(
            cbc::Decryptor::<Aes256>::new_from_slices(&key, iv)
                .map_err(|_| bad_cipher_setup("AES-256"))?,
            data,
            16,
        ),
        OID_DES_EDE3_CBC => cbc_decrypt_unpad::<TdesEde3>(
            cbc::Decryptor::<TdesEde3>::new_from_slices(&key, iv)
                .map_err(|_| bad_cipher_setup("3DES"))?,
            data,
            8,
        ),
        _ => unreachable!("scheme OID checked above"),
    }
}

/// PBKDF2 with the PRF selected by OID. The password is used in its UTF-8
/// form, per RFC 8018 as applied to PKCS#12 PBES2.
fn derive_pbkdf2(
    prf_oid: &[u8],
    password: &str,
    salt: &[u8],
    iterations: u32,
    key_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let mut key = Zeroizing::new(vec![0u8; key_len]);
    let outcome = match prf_oid {
        OID_HMAC_SHA1 => pbkdf2::pbkdf2::<Hmac<Sha1>>(password.as_bytes(), salt, iterations, &mut key),
        OID_HMAC_SHA224 => {
            pbkdf2::pbkdf2::<Hmac<Sha224>>(password.as_bytes(), salt, iterations, &mut key)
        },
        OID_HMAC_SHA256 => {
            pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, iterations, &mut key)
        },
        OID_HMAC_SHA384 => {
            pbkdf2::pbkdf2::<Hmac<Sha384>>(password.as_bytes(), salt, iterations, &mut key)
        },
        OID_HMAC_SHA512 => {
            pbkdf2::pbkdf2::<Hmac<Sha512>>(password.as_bytes(), salt, iterations, &mut key)
        },
        other => {
            return Err(Error::UnsupportedAlgorithm(format!(
                "PBKDF2 PRF OID {}",
                format_oid(other)
            )));
        },
    };
    outcome.map_err(|_| Error::MalformedIdentity("PBKDF2 output length invalid".to_string()))?;
    Ok(key)
}

/// The RFC 7292 Appendix B key derivation function.
///
/// `SHA-1` and `SHA-256` both use a 64-byte block. The password enters as a
/// BMPString: UTF-16BE code units followed by a two-byte NUL terminator.
pub fn derive_pkcs12<D: Digest + FixedOutputReset>(
    password: &str,
    salt: &[u8],
    purpose: KeyPurpose,
    iterations: u64,
    out_len: usize,
) -> Zeroizing<Vec<u8>> {
    const V: usize = 64;

    let mut password_bmp = bmp_string(password);

    // D: the purpose byte repeated over one block
    let diversifier = [purpose as u8; V];

    // S and P: salt and password, each repeated up to a block multiple
    let mut i_block: Vec<u8> = Vec::new();
    extend_repeated(&mut i_block, salt, V);
    extend_repeated(&mut i_block, &password_bmp, V);

    let mut out = Zeroizing::new(Vec::with_capacity(out_len));
    while out.len() < out_len {
        // A = H^iterations(D || I)
        let mut hasher = D::new();
        Digest::update(&mut hasher, diversifier);
        Digest::update(&mut hasher, &i_block);
        let mut a = Digest::finalize_reset(&mut hasher).to_vec();
        for _ in 1..iterations {
            Digest::update(&mut hasher, &a);
            a = Digest::finalize_reset(&mut hasher).to_vec();
        }

        let take = (out_len - out.len()).min(a.len());
        out.extend_from_slice(&a[..take]);
        if out.len() >= out_len {
            a.zeroize();
            break;
        }

        // B = A repeated to one block; I_j = (I_j + B + 1) mod 2^(8*V)
        let mut b = [0u8; V];
        for (dst, src) in b.iter_mut().zip(a.iter().cycle()) {
            *dst = *src;
        }
        for chunk in i_block.chunks_mut(V) {
            let mut carry = 1u16;
            for (byte, add) in chunk.iter_mut().rev().zip(b.iter().rev()) {
                let sum = u16::from(*byte) + u16::from(*add) + carry;
                *byte = sum as u8;
                carry = sum >> 8;
            }
        }
        a.zeroize();
    }

    password_bmp.zeroize();
    i_block.zeroize();
    out
}

/// UTF-16BE with a trailing two-byte NUL, the PKCS#12 password form.
fn bmp_string(password: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(password.len() * 2 + 2);
    for unit in password.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out.extend_from_slice(&[0, 0]);
    out
}

fn extend_repeated(out: &mut Vec<u8>, data: &[u8], block: usize) {
    if data.is_empty() {
        return;
    }
    let target = data.len().div_ceil(block) * block;
    out.extend(data.iter().cycle().take(target));
}

/// pkcs-12PbeParams ::= SEQUENCE { salt OCTET STRING, iterations INTEGER }
fn read_pkcs12_pbe_params(params: &[u8]) -> Result<(Vec<u8>, u64)> {
    let mut reader = DerReader::new(params);
    let seq = reader.expect(tag::SEQUENCE)?;
    let mut inner = seq.reader();
    let salt = inner.expect(tag::OCTET_STRING)?.content.to_vec();
    let iterations = inner.expect_u64()?;
    Ok((salt, iterations))
}

/// CBC-decrypt and strip PKCS#7 padding. Invalid padding maps to
/// [`Error::InvalidCredentials`].
fn cbc_decrypt_unpad<C>(
    decryptor: cbc::Decryptor<C>,
    data: &[u8],
    block_len: usize,
) -> Result<Vec<u8>>
where
    C: aes::cipher::BlockCipher + aes::cipher::BlockDecryptMut,
{
    if data.is_empty() || data.len() % block_len != 0 {
        return Err(Error::InvalidCredentials);
    }

    let mut buffer = data.to_vec();
    decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| Error::InvalidCredentials)?;

    // Strip PKCS#7 padding manually, verifying every pad byte
    let pad = usize::from(*buffer.last().unwrap_or(&0));
    if pad == 0 || pad > block_len || pad > buffer.len() {
        buffer.zeroize();
        return Err(Error::InvalidCredentials);
    }
    let content_len = buffer.len() - pad;
    if buffer[content_len..].iter().any(|&b| b != pad as u8) {
        buffer.zeroize();
        return Err(Error::InvalidCredentials);
    }
    buffer.truncate(content_len);
    Ok(buffer)
}

fn bad_cipher_setup(which: &str) -> Error {
    Error::MalformedIdentity(format!("{} key or IV has the wrong length", which))
}

/// Dotted-decimal rendering of OID content bytes, for error messages.
pub fn format_oid(content: &[u8]) -> String {
    if content.is_empty() {
        return "<empty>".to_string();
    }
    let mut parts = vec![
        (content[0] / 40).to_string(),
        (content[0] % 40).to_string(),
    ];
    let mut value: u64 = 0;
    for &byte in &content[1..] {
        value = (value << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            parts.push(value.to_string());
            value = 0;
        }
    }
    parts.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bmp_string_encoding() {
        assert_eq!(bmp_string("ab"), vec![0, b'a', 0, b'b', 0, 0]);
        assert_eq!(bmp_string(""), vec![0, 0]);
        // Non-ASCII goes through UTF-16
        assert_eq!(bmp_string("é"), vec![0x00, 0xE9, 0, 0]);
    }

    #[test]
    fn test_format_oid() {
        assert_eq!(format_oid(&[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x05, 0x0D]), "1.2.840.113549.1.5.13");
        assert_eq!(format_oid(&[0x2B, 0x0E, 0x03, 0x02, 0x1A]), "1.3.14.3.2.26");
    }

    #[test]
    fn test_pkcs12_kdf_sha1_vector() {
        // Known vector: password "smeg", salt 0A58CF64530D823F,
        // ID 1, 1 iteration, 24 bytes (from the widely cross-checked
        // PKCS#12 KDF test set).
        let salt = [0x0A, 0x58, 0xCF, 0x64, 0x53, 0x0D, 0x82, 0x3F];
        let key = derive_pkcs12::<Sha1>("smeg", &salt, KeyPurpose::Key, 1, 24);
        assert_eq!(
            key.as_slice(),
            &[
                0x8A, 0xAA, 0xE6, 0x29, 0x7B, 0x6C, 0xB0, 0x46, 0x42, 0xAB, 0x5B, 0x07, 0x78,
                0x51, 0x28, 0x4E, 0xB7, 0x12, 0x8F, 0x1A, 0x2A, 0x7F, 0xBC, 0xA3
            ]
        );
    }

    #[test]
    fn test_pkcs12_kdf_iv_purpose_differs() {
        let salt = [0x0A, 0x58, 0xCF, 0x64, 0x53, 0x0D, 0x82, 0x3F];
        let iv = derive_pkcs12::<Sha1>("smeg", &salt, KeyPurpose::Iv, 1, 8);
        assert_eq!(iv.as_slice(), &[0x79, 0x99, 0x3D, 0xFE, 0x04, 0x8D, 0x3B, 0x76]);
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        let alg = AlgorithmIdentifier { oid: &[0x2A, 0x03], params: &[] };
        assert!(matches!(
            decrypt(&alg, "pw", &[0u8; 16]),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_pbes2_aes_round_trip() {
        use aes::cipher::BlockEncryptMut;

        // Encrypt a payload with parameters we then express as DER, and
        // check decrypt() recovers it.
        let password = "correct horse";
        let salt = b"saltsalt";
        let iterations = 100u32;
        let iv = [7u8; 16];

        let mut key = [0u8; 16];
        pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, iterations, &mut key).unwrap();

        let plaintext = b"attack at dawn";
        let mut padded = plaintext.to_vec();
        let pad = 16 - plaintext.len() % 16;
        padded.extend(std::iter::repeat(pad as u8).take(pad));
        let len = padded.len();
        cbc::Encryptor::<Aes128>::new_from_slices(&key, &iv)
            .unwrap()
            .encrypt_padded_mut::<NoPadding>(&mut padded, len)
            .unwrap();

        // PBES2-params DER: SEQ { SEQ { pbkdf2-oid, SEQ { salt, iter, prf } },
        //                         SEQ { aes128-oid, OCTET iv } }
        let der = {
            let tlv = |tag: u8, content: &[u8]| {
                let mut v = vec![tag, content.len() as u8];
                v.extend_from_slice(content);
                v
            };
            let prf = {
                let mut c = tlv(0x06, OID_HMAC_SHA256);
                c.extend_from_slice(&[0x05, 0x00]);
                tlv(0x30, &c)
            };
            let kdf_params = {
                let mut c = tlv(0x04, salt);
                c.extend_from_slice(&tlv(0x02, &[100]));
                c.extend_from_slice(&prf);
                tlv(0x30, &c)
            };
            let kdf = {
                let mut c = tlv(0x06, OID_PBKDF2);
                c.extend_from_slice(&kdf_params);
                tlv(0x30, &c)
            };
            let scheme = {
                let mut c = tlv(0x06, OID_AES128_CBC);
                c.extend_from_slice(&tlv(0x04, &iv));
                tlv(0x30, &c)
            };
            let mut c = kdf;
            c.extend_from_slice(&scheme);
            tlv(0x30, &c)
        };

        let alg = AlgorithmIdentifier { oid: OID_PBES2, params: &der };
        let decrypted = decrypt(&alg, password, &padded).unwrap();
        assert_eq!(decrypted, plaintext);

        // A wrong password fails as InvalidCredentials, not a panic
        assert!(matches!(
            decrypt(&alg, "wrong", &padded),
            Err(Error::InvalidCredentials)
        ));
    }

    #[test]
    fn test_empty_ciphertext_is_invalid_credentials() {
        let (salt_der, _) = {
            let mut c = vec![0x04, 0x04, 1, 2, 3, 4];
            c.extend_from_slice(&[0x02, 0x01, 0x01]);
            let mut seq = vec![0x30, c.len() as u8];
            seq.extend_from_slice(&c);
            (seq, ())
        };
        let alg = AlgorithmIdentifier { oid: OID_PBE_SHA1_3DES, params: &salt_der };
        assert!(matches!(decrypt(&alg, "pw", &[]), Err(Error::InvalidCredentials)));
    }
}
