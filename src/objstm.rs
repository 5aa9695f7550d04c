//! Object stream extraction (PDF 1.5+).
//!
//! An object stream (`/Type /ObjStm`) packs many small objects into one
//! compressed stream. The decoded payload starts with `/N` integer pairs of
//! (object number, byte offset relative to `/First`), followed by the
//! objects themselves. Catalog and page dictionaries frequently live here
//! in files written by modern producers, so structural reads must unpack
//! them even though this engine never writes compressed objects back.

use crate::error::{Error, Result};
use crate::object::Object;
use crate::parser::parse_direct;
use std::collections::HashMap;

/// Upper bound on `/N`; larger values indicate a corrupt dictionary.
const MAX_MEMBER_COUNT: i64 = 1_000_000;

/// Upper bound on `/First` for the same reason.
const MAX_FIRST_OFFSET: i64 = 10_000_000;

/// Decode an object stream and parse every member object.
///
/// Returns a map from object number to its parsed body. A member that
/// fails to parse is skipped with a warning so one bad entry cannot take
/// down the rest of the stream.
///
/// # Errors
///
/// Returns `Error::InvalidPdf` if the object is not a stream, `/N` or
/// `/First` is missing or out of range, or the decoded payload is shorter
/// than `/First`.
pub fn extract_members(stream: &Object) -> Result<HashMap<u32, Object>> {
    let dict = match stream {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::InvalidPdf(format!(
                "object stream is a {}, expected a stream",
                other.type_name()
            )));
        },
    };

    if let Some(type_name) = dict.get("Type").and_then(Object::as_name) {
        if type_name != "ObjStm" {
            return Err(Error::InvalidPdf(format!(
                "expected /Type /ObjStm, got /Type /{}",
                type_name
            )));
        }
    }

    let n = dict
        .get("N")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::InvalidPdf("object stream missing /N".to_string()))?;
    let first = dict
        .get("First")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::InvalidPdf("object stream missing /First".to_string()))?;

    if !(0..=MAX_MEMBER_COUNT).contains(&n) {
        return Err(Error::InvalidPdf(format!("object stream /N {} out of range", n)));
    }
    if !(0..=MAX_FIRST_OFFSET).contains(&first) {
        return Err(Error::InvalidPdf(format!("object stream /First {} out of range", first)));
    }
    let n = n as usize;
    let first = first as usize;

    let decoded = stream.decode_stream_data()?;
    if decoded.len() < first {
        return Err(Error::InvalidPdf(format!(
            "object stream payload is {} bytes, /First claims {}",
            decoded.len(),
            first
        )));
    }

    let pairs = parse_member_table(&decoded[..first], n)?;
    let bodies = &decoded[first..];

    let mut members = HashMap::with_capacity(n);
    for (number, offset) in pairs {
        if offset >= bodies.len() {
            log::warn!(
                "object {} claims offset {} beyond stream payload ({} bytes), skipping",
                number,
                offset,
                bodies.len()
            );
            continue;
        }
        match parse_direct(&bodies[offset..]) {
            Ok((obj, _)) => {
                members.insert(number, obj);
            },
            Err(e) => {
                log::warn!("skipping unparseable stream member {}: {}", number, e);
            },
        }
    }

    Ok(members)
}

/// Parse the `/N` (object number, offset) integer pairs before `/First`.
fn parse_member_table(data: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count);
    let mut cursor = data;

    for i in 0..count {
        let (num_obj, used) = parse_direct(cursor)
            .map_err(|_| Error::InvalidPdf(format!("bad object number in pair {}", i)))?;
        cursor = &cursor[used..];
        let (off_obj, used) = parse_direct(cursor)
            .map_err(|_| Error::InvalidPdf(format!("bad offset in pair {}", i)))?;
        cursor = &cursor[used..];

        let number = num_obj
            .as_integer()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| Error::InvalidPdf(format!("pair {} holds a non-integer number", i)))?;
        let offset = off_obj
            .as_integer()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| Error::InvalidPdf(format!("pair {} holds a non-integer offset", i)))?;
        pairs.push((number, offset));
    }

    Ok(pairs)
}
