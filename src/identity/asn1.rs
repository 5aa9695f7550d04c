//! Minimal DER reader.
//!
//! Reads the tag-length-value structure of BER/DER as used by PKCS#12,
//! PKCS#8, and CMS. Only definite lengths are accepted; indefinite-length
//! encodings are rejected (DER forbids them, and every container this
//! engine consumes is DER).

use crate::error::{Error, Result};

/// Universal class tags this crate reads.
pub mod tag {
    pub const INTEGER: u8 = 0x02;
    pub const BIT_STRING: u8 = 0x03;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OID: u8 = 0x06;
    pub const UTF8_STRING: u8 = 0x0C;
    pub const PRINTABLE_STRING: u8 = 0x13;
    pub const UTC_TIME: u8 = 0x17;
    pub const SEQUENCE: u8 = 0x30;
    pub const SET: u8 = 0x31;
    /// Constructed context-specific tag `[n]`.
    pub const fn context(n: u8) -> u8 {
        0xA0 | n
    }
    /// Primitive context-specific tag `[n]`.
    pub const fn context_primitive(n: u8) -> u8 {
        0x80 | n
    }
}

/// One decoded tag-length-value element.
///
/// `content` borrows the value bytes; `raw` additionally covers the header,
/// which callers need when a structure is hashed or re-signed as encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tag: u8,
    pub content: &'a [u8],
    pub raw: &'a [u8],
}

impl<'a> Tlv<'a> {
    /// Read the element's content as a nested reader.
    pub fn reader(&self) -> DerReader<'a> {
        DerReader::new(self.content)
    }
}

/// Cursor over a DER-encoded byte slice.
#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// True when every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// The tag of the next element, without advancing.
    pub fn peek_tag(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    /// Read the next element.
    pub fn read(&mut self) -> Result<Tlv<'a>> {
        let start = self.pos;
        let tag = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| truncated("tag", self.pos))?;
        self.pos += 1;

        let first = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| truncated("length", self.pos))?;
        self.pos += 1;

        let len = if first < 0x80 {
            usize::from(first)
        } else if first == 0x80 {
            return Err(Error::MalformedIdentity(
                "indefinite-length encoding is not DER".to_string(),
            ));
        } else {
            let count = usize::from(first & 0x7F);
            if count > 4 {
                return Err(Error::MalformedIdentity(format!(
                    "unreasonable DER length of {} bytes",
                    count
                )));
            }
            let mut len = 0usize;
            for _ in 0..count {
                let byte = *self
                    .buf
                    .get(self.pos)
                    .ok_or_else(|| truncated("length", self.pos))?;
                self.pos += 1;
                len = (len << 8) | usize::from(byte);
            }
            len
        };

        let content_start = self.pos;
        let content_end = content_start
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| truncated("content", content_start))?;
        self.pos = content_end;

        Ok(Tlv {
            tag,
            content: &self.buf[content_start..content_end],
            raw: &self.buf[start..content_end],
        })
    }

    /// Read the next element, requiring `expected` as its tag.
    pub fn expect(&mut self, expected: u8) -> Result<Tlv<'a>> {
        let tlv = self.read()?;
        if tlv.tag != expected {
            return Err(Error::MalformedIdentity(format!(
                "expected DER tag 0x{:02X}, found 0x{:02X}",
                expected, tlv.tag
            )));
        }
        Ok(tlv)
    }

    /// Read an optional element: consumed and returned only when its tag
    /// matches.
    pub fn take(&mut self, expected: u8) -> Result<Option<Tlv<'a>>> {
        if self.peek_tag() == Some(expected) {
            Ok(Some(self.read()?))
        } else {
            Ok(None)
        }
    }

    /// Read an INTEGER as u64, rejecting negatives and overflow.
    pub fn expect_u64(&mut self) -> Result<u64> {
        let tlv = self.expect(tag::INTEGER)?;
        let bytes = tlv.content;
        if bytes.is_empty() {
            return Err(Error::MalformedIdentity("empty INTEGER".to_string()));
        }
        if bytes[0] & 0x80 != 0 {
            return Err(Error::MalformedIdentity(
                "negative INTEGER where a count was expected".to_string(),
            ));
        }
        let digits = if bytes[0] == 0 { &bytes[1..] } else { bytes };
        if digits.len() > 8 {
            return Err(Error::MalformedIdentity("INTEGER too large".to_string()));
        }
        Ok(digits.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
    }

    /// Read an OBJECT IDENTIFIER, returning its content bytes.
    pub fn expect_oid(&mut self) -> Result<&'a [u8]> {
        Ok(self.expect(tag::OID)?.content)
    }
}

fn truncated(what: &str, at: usize) -> Error {
    Error::MalformedIdentity(format!("truncated DER: {} missing at offset {}", what, at))
}

/// An AlgorithmIdentifier: OID plus raw (still-encoded) parameters.
#[derive(Debug, Clone, Copy)]
pub struct AlgorithmIdentifier<'a> {
    pub oid: &'a [u8],
    /// Everything after the OID, usually NULL or algorithm parameters.
    pub params: &'a [u8],
}

/// Parse `SEQUENCE { algorithm OID, parameters ANY OPTIONAL }`.
pub fn read_algorithm_identifier<'a>(reader: &mut DerReader<'a>) -> Result<AlgorithmIdentifier<'a>> {
    let seq = reader.expect(tag::SEQUENCE)?;
    let mut inner = seq.reader();
    let oid_tlv = inner.expect(tag::OID)?;
    Ok(AlgorithmIdentifier {
        oid: oid_tlv.content,
        params: &seq.content[inner.pos..],
    })
}
