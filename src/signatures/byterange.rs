//! Byte-range math for detached signatures.
//!
//! A signed document is hashed over everything except the reserved
//! `/Contents` placeholder. The placeholder span runs from its opening `<`
//! through its closing `>`, so the two covered ranges are
//! `[0, placeholder_start)` and `[placeholder_end, total)` and the invariant
//! `sum(lengths) + placeholder_length == total` always holds.
//!
//! `/ByteRange` is rendered with fixed-width zero-padded integers so the
//! value can be patched in place after the final offsets are known, without
//! shifting any byte that follows it.

use crate::error::{Error, Result};
use crate::signatures::types::DigestAlgorithm;

/// Width of each rendered `/ByteRange` integer. 10 decimal digits cover any
/// offset below 10 GB, far beyond what a single PDF reaches.
pub const BYTE_RANGE_DIGITS: usize = 10;

/// The reserved `/Contents` span in the output, delimiters included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderSpan {
    /// Offset of the opening `<`.
    pub start: usize,
    /// Length from `<` through `>` inclusive.
    pub len: usize,
}

impl PlaceholderSpan {
    /// Offset one past the closing `>`.
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Raw bytes the hex interior can carry.
    pub fn capacity(&self) -> usize {
        (self.len - 2) / 2
    }
}

/// The two signed ranges for a placeholder inside `total` output bytes.
pub fn byte_ranges(total: usize, span: PlaceholderSpan) -> [(usize, usize); 2] {
    [(0, span.start), (span.end(), total - span.end())]
}

/// Check the covering invariant: the ranges plus the placeholder account for
/// every output byte exactly once.
pub fn validate(ranges: &[(usize, usize); 2], span: PlaceholderSpan, total: usize) -> Result<()> {
    let covered = ranges[0].1 + ranges[1].1 + span.len;
    if ranges[0].0 != 0
        || ranges[0].1 != span.start
        || ranges[1].0 != span.end()
        || covered != total
    {
        return Err(Error::InvalidPdf(format!(
            "byte ranges {:?} do not cover {} bytes around placeholder at {}..{}",
            ranges,
            total,
            span.start,
            span.end()
        )));
    }
    Ok(())
}

/// Hash the two covered ranges of `output` as one message.
pub fn digest_ranges(
    output: &[u8],
    ranges: &[(usize, usize); 2],
    algorithm: DigestAlgorithm,
) -> Vec<u8> {
    let before = &output[ranges[0].0..ranges[0].0 + ranges[0].1];
    let after = &output[ranges[1].0..ranges[1].0 + ranges[1].1];
    algorithm.digest_spans(&[before, after])
}

/// Concatenate the ranges a `/ByteRange` array names, bounds-checked.
///
/// Used when reading a signed document back: the stored offsets are
/// untrusted and must stay inside the file.
pub fn extract_ranges(bytes: &[u8], ranges: &[(usize, usize)]) -> Result<Vec<u8>> {
    let mut joined = Vec::with_capacity(ranges.iter().map(|(_, len)| len).sum());
    for &(offset, len) in ranges {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                Error::InvalidPdf(format!(
                    "byte range ({}, {}) exceeds file of {} bytes",
                    offset,
                    len,
                    bytes.len()
                ))
            })?;
        joined.extend_from_slice(&bytes[offset..end]);
    }
    Ok(joined)
}

/// Render a `/ByteRange` value with fixed-width integers, e.g.
/// `[0000000000 0000001234 0000017620 0000000890]`.
pub fn render_byte_range(ranges: &[(usize, usize); 2]) -> String {
    format!(
        "[{:0w$} {:0w$} {:0w$} {:0w$}]",
        ranges[0].0,
        ranges[0].1,
        ranges[1].0,
        ranges[1].1,
        w = BYTE_RANGE_DIGITS
    )
}

/// Hex-encode the signature container into the placeholder interior,
/// padding the remainder with `0` digits.
///
/// # Errors
///
/// [`Error::PlaceholderTooSmall`] when the container exceeds the reserved
/// capacity; the output is left untouched in that case.
pub fn fill_placeholder(
    output: &mut [u8],
    span: PlaceholderSpan,
    container: &[u8],
) -> Result<()> {
    if container.len() > span.capacity() {
        return Err(Error::PlaceholderTooSmall {
            needed: container.len(),
            capacity: span.capacity(),
        });
    }

    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let interior = &mut output[span.start + 1..span.start + span.len - 1];
    for (i, byte) in container.iter().enumerate() {
        interior[2 * i] = DIGITS[usize::from(byte >> 4)];
        interior[2 * i + 1] = DIGITS[usize::from(byte & 0x0F)];
    }
    // The interior was rendered as all zeros, so the tail past the container
    // is already valid padding.
    Ok(())
}
