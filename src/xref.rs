//! Cross-reference machinery.
//!
//! A PDF's cross-reference data maps object numbers to byte locations,
//! giving random access to indirect objects. This module reads the whole
//! chain of a document (classic tables, PDF 1.5+ cross-reference streams,
//! hybrid files, and `/Prev` links from earlier incremental updates) and
//! also renders the classic table section that an incremental update
//! appends.
//!
//! Reading merges newest-first: an entry from a later update always shadows
//! the same object number in an earlier one.

use crate::error::{Error, Result};
use crate::object::Object;
use crate::parser::{find_stream_end, parse_direct, parse_indirect_at};
use std::collections::HashMap;

/// Hard cap on `/Prev` chain length; a longer chain is assumed circular.
const MAX_PREV_DEPTH: u32 = 100;

/// Cap on subsection entry counts, to reject absurd tables early.
const MAX_SUBSECTION_ENTRIES: u64 = 10_000_000;

/// Where an object lives, as recorded by the cross-reference data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    /// Free entry; `next_free` is the head of the free list continuation
    Free { next_free: u32, generation: u16 },
    /// Uncompressed object at a byte offset in the file
    InFile { offset: u64, generation: u16 },
    /// Compressed object stored inside an object stream
    InStream { stream_number: u32, index: u16 },
}

impl XrefEntry {
    /// Byte offset for uncompressed entries.
    pub fn file_offset(&self) -> Option<u64> {
        match self {
            XrefEntry::InFile { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// True when the entry points at a live object.
    pub fn is_in_use(&self) -> bool {
        !matches!(self, XrefEntry::Free { .. })
    }
}

/// Merged cross-reference data for a document.
///
/// `trailer` holds the newest trailer dictionary with missing keys filled
/// from older updates, so `/Root`, `/Size`, `/Info` and `/ID` resolve even
/// when an incremental update omitted them.
#[derive(Debug, Clone, Default)]
pub struct XrefTable {
    pub(crate) entries: HashMap<u32, XrefEntry>,
    pub(crate) trailer: HashMap<String, Object>,
}

impl XrefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the entry for an object number.
    pub fn get(&self, number: u32) -> Option<&XrefEntry> {
        self.entries.get(&number)
    }

    pub fn contains(&self, number: u32) -> bool {
        self.entries.contains_key(&number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The trailer dictionary (newest update wins per key).
    pub fn trailer(&self) -> &HashMap<String, Object> {
        &self.trailer
    }

    /// Highest object number with an entry.
    pub fn max_object_number(&self) -> u32 {
        self.entries.keys().copied().max().unwrap_or(0)
    }

    /// Fold an older update's table underneath this one.
    ///
    /// Existing entries and trailer keys are kept; only gaps are filled.
    fn absorb_older(&mut self, older: XrefTable) {
        for (number, entry) in older.entries {
            self.entries.entry(number).or_insert(entry);
        }
        for (key, value) in older.trailer {
            self.trailer.entry(key).or_insert(value);
        }
    }
}

/// Locate the `startxref` offset by scanning the file tail.
///
/// Looks for the last `startxref` keyword in the final 2 KiB (large
/// trailers push the keyword further from EOF than the canonical few
/// lines).
pub fn find_startxref(buf: &[u8]) -> Result<u64> {
    if buf.is_empty() {
        return Err(Error::EmptyDocument);
    }

    let tail_len = buf.len().min(2048);
    let tail = &buf[buf.len() - tail_len..];
    let keyword = b"startxref";
    let pos = tail
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or_else(|| {
            Error::TruncatedPdf("startxref keyword not found near end of file".to_string())
        })?;

    let mut cursor = buf.len() - tail_len + pos + keyword.len();
    skip_ws_at(buf, &mut cursor);
    read_uint_at(buf, &mut cursor)
        .map_err(|_| Error::TruncatedPdf("no offset follows the startxref keyword".to_string()))
}

/// Read and merge the full cross-reference chain starting at `offset`.
pub fn read_xref_chain(buf: &[u8], offset: u64) -> Result<XrefTable> {
    read_chain_at(buf, offset, 0)
}

fn read_chain_at(buf: &[u8], offset: u64, depth: u32) -> Result<XrefTable> {
    if depth > MAX_PREV_DEPTH {
        return Err(Error::InvalidPdf(format!(
            "/Prev chain exceeds {} sections, assuming a cycle",
            MAX_PREV_DEPTH
        )));
    }

    let mut pos = usize::try_from(offset)
        .ok()
        .filter(|&p| p < buf.len())
        .ok_or_else(|| {
            Error::TruncatedPdf(format!(
                "cross-reference offset {} beyond end of file ({})",
                offset,
                buf.len()
            ))
        })?;

    skip_ws_at(buf, &mut pos);
    log::debug!("reading cross-reference section at offset {} (depth {})", pos, depth);

    let mut table = if buf[pos..].starts_with(b"xref") {
        parse_classic_section(buf, pos)?
    } else if buf.get(pos).is_some_and(u8::is_ascii_digit) {
        parse_stream_section(buf, pos)?
    } else {
        return Err(Error::InvalidPdf(format!(
            "offset {} holds neither an xref table nor a cross-reference stream",
            pos
        )));
    };

    // Hybrid file: the classic trailer points at a cross-reference stream
    // holding the real entries for compressed objects. Those entries shadow
    // the classic ones of the same update (ISO 32000-1:2008, 7.5.8.4).
    if let Some(stm_offset) = table.trailer.get("XRefStm").and_then(Object::as_integer) {
        match usize::try_from(stm_offset)
            .map_err(|_| Error::InvalidPdf("negative /XRefStm offset".to_string()))
            .and_then(|o| parse_stream_section(buf, o))
        {
            Ok(stream_table) => {
                for (number, entry) in stream_table.entries {
                    table.entries.insert(number, entry);
                }
            },
            Err(e) => log::warn!("ignoring unreadable /XRefStm section: {}", e),
        }
    }

    if let Some(prev) = table.trailer.get("Prev").and_then(Object::as_integer) {
        if prev < 0 {
            return Err(Error::InvalidPdf(format!("negative /Prev offset {}", prev)));
        }
        let older = read_chain_at(buf, prev as u64, depth + 1)?;
        table.absorb_older(older);
    }

    Ok(table)
}

/// Parse a classic cross-reference table (`xref` keyword through `trailer`).
fn parse_classic_section(buf: &[u8], offset: usize) -> Result<XrefTable> {
    let mut pos = offset;
    skip_ws_at(buf, &mut pos);
    if !buf[pos..].starts_with(b"xref") {
        return Err(Error::InvalidPdf(format!("expected xref keyword at offset {}", pos)));
    }
    pos += b"xref".len();

    let mut table = XrefTable::new();
    loop {
        skip_ws_at(buf, &mut pos);
        if buf[pos..].starts_with(b"trailer") {
            pos += b"trailer".len();
            let (obj, _) = parse_direct(&buf[pos..])?;
            match obj {
                Object::Dictionary(dict) => {
                    table.trailer = dict;
                    return Ok(table);
                },
                other => {
                    return Err(Error::InvalidPdf(format!(
                        "trailer is a {}, expected a dictionary",
                        other.type_name()
                    )));
                },
            }
        }
        if pos >= buf.len() {
            return Err(Error::TruncatedPdf(
                "cross-reference table ends without a trailer".to_string(),
            ));
        }

        // Subsection header: first object number, entry count
        let start = read_uint_at(buf, &mut pos)?;
        skip_ws_at(buf, &mut pos);
        let count = read_uint_at(buf, &mut pos)?;
        if count > MAX_SUBSECTION_ENTRIES {
            return Err(Error::InvalidPdf(format!(
                "xref subsection claims {} entries, exceeding the {} limit",
                count, MAX_SUBSECTION_ENTRIES
            )));
        }
        let start = u32::try_from(start)
            .map_err(|_| Error::InvalidPdf(format!("xref subsection start {} too large", start)))?;

        for i in 0..count {
            skip_ws_at(buf, &mut pos);
            let field1 = read_uint_at(buf, &mut pos)?;
            skip_ws_at(buf, &mut pos);
            let field2 = read_uint_at(buf, &mut pos)?;
            skip_ws_at(buf, &mut pos);

            let generation = u16::try_from(field2).map_err(|_| {
                Error::InvalidPdf(format!("xref generation {} exceeds 65535", field2))
            })?;
            let number = start
                .checked_add(i as u32)
                .ok_or_else(|| Error::InvalidPdf("xref object number overflow".to_string()))?;

            match buf.get(pos).copied() {
                Some(b'n') => {
                    table.entries.insert(number, XrefEntry::InFile { offset: field1, generation });
                },
                Some(b'f') => {
                    table.entries.insert(
                        number,
                        XrefEntry::Free { next_free: field1 as u32, generation },
                    );
                },
                other => {
                    return Err(Error::InvalidPdf(format!(
                        "xref entry for object {} has type {:?}, expected 'n' or 'f'",
                        number,
                        other.map(|c| c as char)
                    )));
                },
            }
            pos += 1;
        }
    }
}

/// Parse a PDF 1.5+ cross-reference stream at `offset`.
///
/// The stream dictionary doubles as the trailer. `/Length` must be direct
/// here (references cannot be resolved before the table exists); a broken
/// length falls back to scanning for `endstream`.
fn parse_stream_section(buf: &[u8], offset: usize) -> Result<XrefTable> {
    let parsed = parse_indirect_at(buf, offset)?;
    let dict = match parsed.object {
        Object::Dictionary(dict) => dict,
        other => {
            return Err(Error::InvalidPdf(format!(
                "cross-reference stream object is a {}",
                other.type_name()
            )));
        },
    };
    let data_start = parsed.stream_data_start.ok_or_else(|| {
        Error::InvalidPdf("cross-reference stream object carries no stream data".to_string())
    })?;

    if let Some(type_name) = dict.get("Type").and_then(Object::as_name) {
        if type_name != "XRef" {
            return Err(Error::InvalidPdf(format!(
                "expected /Type /XRef, got /Type /{}",
                type_name
            )));
        }
    }

    let data_end = match dict.get("Length").and_then(Object::as_integer) {
        Some(len) if len >= 0 && data_start.checked_add(len as usize).is_some_and(|e| e <= buf.len()) => {
            data_start + len as usize
        },
        _ => {
            log::warn!(
                "cross-reference stream at offset {} has an unusable /Length, scanning for endstream",
                offset
            );
            find_stream_end(buf, data_start).ok_or_else(|| {
                Error::TruncatedPdf("unterminated cross-reference stream".to_string())
            })?
        },
    };

    let stream = Object::Stream {
        dict: dict.clone(),
        data: bytes::Bytes::copy_from_slice(&buf[data_start..data_end]),
    };
    let decoded = stream.decode_stream_data()?;

    let widths = dict
        .get("W")
        .and_then(Object::as_array)
        .ok_or_else(|| Error::InvalidPdf("cross-reference stream missing /W".to_string()))?;
    if widths.len() != 3 {
        return Err(Error::InvalidPdf(format!("/W has {} elements, expected 3", widths.len())));
    }
    let mut w = [0usize; 3];
    for (slot, obj) in w.iter_mut().zip(widths) {
        *slot = obj
            .as_integer()
            .and_then(|v| usize::try_from(v).ok())
            .filter(|&v| v <= 8)
            .ok_or_else(|| Error::InvalidPdf("/W holds an invalid field width".to_string()))?;
    }
    let entry_size = w[0] + w[1] + w[2];
    if entry_size == 0 {
        return Err(Error::InvalidPdf("/W describes zero-width entries".to_string()));
    }

    let size = dict
        .get("Size")
        .and_then(Object::as_integer)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| Error::InvalidPdf("cross-reference stream missing /Size".to_string()))?;

    let index_ranges: Vec<(u32, u32)> = match dict.get("Index") {
        Some(obj) => {
            let array = obj
                .as_array()
                .ok_or_else(|| Error::InvalidPdf("/Index is not an array".to_string()))?;
            if !array.len().is_multiple_of(2) {
                return Err(Error::InvalidPdf("/Index has an odd element count".to_string()));
            }
            let mut ranges = Vec::with_capacity(array.len() / 2);
            for pair in array.chunks_exact(2) {
                let start = pair[0]
                    .as_integer()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| Error::InvalidPdf("invalid /Index start".to_string()))?;
                let count = pair[1]
                    .as_integer()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| Error::InvalidPdf("invalid /Index count".to_string()))?;
                ranges.push((start, count));
            }
            ranges
        },
        None => vec![(0, size)],
    };

    let mut table = XrefTable::new();
    let mut data_pos = 0usize;

    for (start, count) in index_ranges {
        if u64::from(count) > MAX_SUBSECTION_ENTRIES {
            return Err(Error::InvalidPdf(format!(
                "/Index range claims {} entries, exceeding the {} limit",
                count, MAX_SUBSECTION_ENTRIES
            )));
        }
        for i in 0..count {
            let Some(entry_bytes) = decoded.get(data_pos..data_pos + entry_size) else {
                return Err(Error::TruncatedPdf(
                    "cross-reference stream data shorter than /Index describes".to_string(),
                ));
            };
            data_pos += entry_size;

            // A zero-width type field defaults to type 1
            let entry_type = if w[0] > 0 { read_be_int(&entry_bytes[..w[0]]) } else { 1 };
            let field2 = read_be_int(&entry_bytes[w[0]..w[0] + w[1]]);
            let field3 = read_be_int(&entry_bytes[w[0] + w[1]..]);
            let number = start
                .checked_add(i)
                .ok_or_else(|| Error::InvalidPdf("xref object number overflow".to_string()))?;

            let narrow16 = |v: u64| {
                u16::try_from(v).map_err(|_| {
                    Error::InvalidPdf(format!("xref field {} exceeds 16 bits", v))
                })
            };
            let entry = match entry_type {
                0 => XrefEntry::Free { next_free: field2 as u32, generation: narrow16(field3)? },
                1 => XrefEntry::InFile { offset: field2, generation: narrow16(field3)? },
                2 => XrefEntry::InStream {
                    stream_number: u32::try_from(field2).map_err(|_| {
                        Error::InvalidPdf(format!("object stream number {} too large", field2))
                    })?,
                    index: narrow16(field3)?,
                },
                // ISO 32000-1:2008, Table 18: other types reference null
                other => {
                    log::warn!("object {}: unknown xref entry type {}, skipping", number, other);
                    continue;
                },
            };
            table.entries.insert(number, entry);
        }
    }

    table.trailer = dict;
    Ok(table)
}

/// One in-use record destined for a rendered classic section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XrefRecord {
    pub number: u32,
    pub offset: u64,
    pub generation: u16,
}

/// Render a classic cross-reference section for the given records.
///
/// Records are grouped into subsection runs of consecutive object numbers;
/// each entry line is the fixed 20-byte `nnnnnnnnnn ggggg n \n` form
/// required by ISO 32000-1:2008, 7.5.4.
pub fn render_classic_section(records: &[XrefRecord]) -> Vec<u8> {
    let mut sorted = records.to_vec();
    sorted.sort_by_key(|r| r.number);

    let mut out = Vec::with_capacity(16 + sorted.len() * 20);
    out.extend_from_slice(b"xref\n");

    let mut i = 0;
    while i < sorted.len() {
        let run_start = i;
        while i + 1 < sorted.len() && sorted[i + 1].number == sorted[i].number + 1 {
            i += 1;
        }
        let run = &sorted[run_start..=i];
        out.extend_from_slice(format!("{} {}\n", run[0].number, run.len()).as_bytes());
        for record in run {
            out.extend_from_slice(
                format!("{:010} {:05} n \n", record.offset, record.generation).as_bytes(),
            );
        }
        i += 1;
    }
    out
}

/// Advance past whitespace bytes.
fn skip_ws_at(buf: &[u8], pos: &mut usize) {
    while let Some(&c) = buf.get(*pos) {
        if matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C) {
            *pos += 1;
        } else {
            break;
        }
    }
}

/// Read an unsigned decimal integer at the cursor.
fn read_uint_at(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let start = *pos;
    let mut value: u64 = 0;
    while let Some(&c) = buf.get(*pos) {
        if !c.is_ascii_digit() {
            break;
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(c - b'0')))
            .ok_or_else(|| Error::InvalidPdf("integer overflow in xref data".to_string()))?;
        *pos += 1;
    }
    if *pos == start {
        return Err(Error::InvalidPdf(format!("expected an integer at offset {}", start)));
    }
    Ok(value)
}

/// Big-endian integer from up to 8 bytes.
fn read_be_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}
