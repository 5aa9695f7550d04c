//! PDF object parser.
//!
//! Parses PDF objects (numbers, strings, names, arrays, dictionaries,
//! references) directly from byte slices. The signing engine reads document
//! structure only — catalog, page tree, trailer, cross-reference material —
//! so escape sequences are decoded eagerly and each parse produces an
//! [`Object`] in one pass rather than a separate token stream.
//!
//! Whitespace (space, \t, \r, \n, NUL, \f) and comments (% to end of line)
//! are skipped between tokens per ISO 32000-1:2008, Section 7.2.2.

use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::{char, digit1, one_of},
    combinator::{opt, value},
    sequence::preceded,
    IResult,
};
use std::collections::HashMap;

/// An indirect object header plus its parsed body.
///
/// For stream objects the body is the stream dictionary and
/// `stream_data_start` holds the absolute offset of the first data byte. The
/// caller resolves `/Length` (which may itself be an indirect reference) and
/// slices the data out of the file buffer.
#[derive(Debug, Clone)]
pub struct IndirectObject {
    /// The object's number and generation
    pub reference: ObjectRef,
    /// The parsed body (the stream dictionary when stream data follows)
    pub object: Object,
    /// Absolute offset of stream data when the body is followed by `stream`
    pub stream_data_start: Option<usize>,
}

/// Parse one run of PDF whitespace (ISO 32000-1:2008, Table 1).
fn whitespace(input: &[u8]) -> IResult<&[u8], ()> {
    let (remaining, ws) =
        take_while(|c| matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C))(input)?;
    if ws.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Space)));
    }
    Ok((remaining, ()))
}

/// Parse a comment (% to end of line).
fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip any amount of whitespace and comments.
fn skip_ws(input: &[u8]) -> IResult<&[u8], ()> {
    let mut remaining = input;
    loop {
        if let Ok((rest, _)) = whitespace(remaining) {
            remaining = rest;
            continue;
        }
        if let Ok((rest, _)) = comment(remaining) {
            remaining = rest;
            continue;
        }
        break;
    }
    Ok((remaining, ()))
}

/// True for PDF delimiter characters (ISO 32000-1:2008, Table 2).
fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// True when a token may legally end here (whitespace, delimiter, or EOF).
fn at_token_boundary(input: &[u8]) -> bool {
    match input.first() {
        None => true,
        Some(&c) => matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C) || is_delimiter(c),
    }
}

/// Parse an integer or real number.
///
/// PDF numbers allow a leading sign and may start or end with the decimal
/// point (`.5`, `5.`, `-.002`).
fn parse_number(input: &[u8]) -> IResult<&[u8], Object> {
    let start = input;
    let (input, sign) = opt(one_of("+-"))(input)?;
    let (input, int_part) = opt(digit1)(input)?;
    let (input, frac_part) = opt(preceded(char('.'), opt(digit1)))(input)?;

    if int_part.is_none() && frac_part.is_none() {
        return Err(nom::Err::Error(nom::error::Error::new(start, nom::error::ErrorKind::Digit)));
    }

    let digit_err = || nom::Err::Error(nom::error::Error::new(start, nom::error::ErrorKind::Digit));

    if let Some(frac) = frac_part {
        let mut num_str = String::new();
        if sign == Some('-') {
            num_str.push('-');
        }
        match int_part {
            Some(int) => num_str.push_str(std::str::from_utf8(int).map_err(|_| digit_err())?),
            None => num_str.push('0'),
        }
        num_str.push('.');
        match frac {
            Some(digits) => {
                num_str.push_str(std::str::from_utf8(digits).map_err(|_| digit_err())?)
            },
            None => num_str.push('0'),
        }
        let num: f64 = num_str.parse().map_err(|_| digit_err())?;
        Ok((input, Object::Real(num)))
    } else {
        let int_bytes = int_part.ok_or_else(digit_err)?;
        let int_str = std::str::from_utf8(int_bytes).map_err(|_| digit_err())?;
        let mut num: i64 = int_str.parse().map_err(|_| digit_err())?;
        if sign == Some('-') {
            num = -num;
        }
        Ok((input, Object::Integer(num)))
    }
}

/// Parse a literal string `( ... )`, decoding escape sequences per
/// ISO 32000-1:2008, Section 7.3.4.2.
///
/// Handles balanced nested parentheses, the single-character escapes (\n,
/// \r, \t, \b, \f, \\, \(, \)), 1-3 digit octal escapes, and backslash line
/// continuations. An unknown escape drops the backslash and keeps the
/// character.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Object> {
    let (rest, _) = char('(')(input)?;
    let mut out = Vec::new();
    let mut depth = 1usize;
    let mut pos = 0usize;

    while pos < rest.len() {
        match rest[pos] {
            b'\\' => {
                pos += 1;
                if pos >= rest.len() {
                    break;
                }
                match rest[pos] {
                    b'n' => {
                        out.push(b'\n');
                        pos += 1;
                    },
                    b'r' => {
                        out.push(b'\r');
                        pos += 1;
                    },
                    b't' => {
                        out.push(b'\t');
                        pos += 1;
                    },
                    b'b' => {
                        out.push(0x08);
                        pos += 1;
                    },
                    b'f' => {
                        out.push(0x0C);
                        pos += 1;
                    },
                    c @ (b'(' | b')' | b'\\') => {
                        out.push(c);
                        pos += 1;
                    },
                    // Line continuation: \<EOL> is dropped (CR, LF, or CRLF)
                    b'\r' => {
                        pos += 1;
                        if pos < rest.len() && rest[pos] == b'\n' {
                            pos += 1;
                        }
                    },
                    b'\n' => {
                        pos += 1;
                    },
                    c if c.is_ascii_digit() && c < b'8' => {
                        let mut val = 0u16;
                        let mut digits = 0;
                        while digits < 3
                            && pos < rest.len()
                            && rest[pos].is_ascii_digit()
                            && rest[pos] < b'8'
                        {
                            val = val * 8 + u16::from(rest[pos] - b'0');
                            pos += 1;
                            digits += 1;
                        }
                        out.push((val & 0xFF) as u8);
                    },
                    c => {
                        out.push(c);
                        pos += 1;
                    },
                }
            },
            b'(' => {
                depth += 1;
                out.push(b'(');
                pos += 1;
            },
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&rest[pos + 1..], Object::String(out)));
                }
                out.push(b')');
                pos += 1;
            },
            c => {
                out.push(c);
                pos += 1;
            },
        }
    }

    // Unbalanced parentheses
    Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)))
}

/// Parse a hexadecimal string `< ... >` into bytes.
///
/// Whitespace between digits is ignored; an odd final digit is padded with
/// zero (ISO 32000-1:2008, Section 7.3.4.3).
fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Object> {
    // `<<` opens a dictionary, not a hex string
    if input.starts_with(b"<<") {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }

    let (rest, _) = char('<')(input)?;
    let (rest, digits) =
        take_while(|c: u8| c.is_ascii_hexdigit() || c.is_ascii_whitespace())(rest)?;
    let (rest, _) = char('>')(rest)?;

    let hex: Vec<u8> = digits.iter().copied().filter(|c| c.is_ascii_hexdigit()).collect();
    let mut out = Vec::with_capacity(hex.len().div_ceil(2));
    for pair in hex.chunks(2) {
        let hi = (pair[0] as char).to_digit(16).unwrap_or(0) as u8;
        let lo = if pair.len() == 2 {
            (pair[1] as char).to_digit(16).unwrap_or(0) as u8
        } else {
            0
        };
        out.push((hi << 4) | lo);
    }

    Ok((rest, Object::String(out)))
}

/// Decode #XX escape sequences in a raw name (ISO 32000-1:2008, 7.3.5).
///
/// A `#` not followed by two hex digits is kept literally.
fn decode_name_escapes(raw: &[u8]) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            if let Ok(hex) = std::str::from_utf8(&raw[i + 1..i + 3]) {
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    result.push(byte as char);
                    i += 3;
                    continue;
                }
            }
        }
        result.push(raw[i] as char);
        i += 1;
    }
    result
}

/// Parse a name object starting with `/`.
fn parse_name(input: &[u8]) -> IResult<&[u8], Object> {
    let (rest, _) = char('/')(input)?;
    let (rest, raw) = take_while(|c: u8| {
        !matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C) && !is_delimiter(c)
    })(rest)?;
    Ok((rest, Object::Name(decode_name_escapes(raw))))
}

/// Parse the keywords `true`, `false`, `null`.
fn parse_keyword(input: &[u8]) -> IResult<&[u8], Object> {
    let (rest, obj) = alt((
        value(Object::Boolean(true), tag("true")),
        value(Object::Boolean(false), tag("false")),
        value(Object::Null, tag("null")),
    ))(input)?;
    if !at_token_boundary(rest) {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }
    Ok((rest, obj))
}

/// Parse an indirect reference `N G R`.
///
/// Must be tried before plain number parsing; it backtracks cleanly when the
/// trailing `R` is absent, so `[1 2 3 0 R]` parses as two integers followed
/// by a reference.
fn parse_reference(input: &[u8]) -> IResult<&[u8], Object> {
    let ref_err = || nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit));

    let (rest, id_digits) = digit1(input)?;
    let (rest, _) = whitespace(rest)?;
    let (rest, gen_digits) = digit1(rest)?;
    let (rest, _) = whitespace(rest)?;
    let (rest, _) = char('R')(rest)?;
    if !at_token_boundary(rest) {
        return Err(ref_err());
    }

    let id: u32 = std::str::from_utf8(id_digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(ref_err)?;
    let gen: u16 = std::str::from_utf8(gen_digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(ref_err)?;

    Ok((rest, Object::Reference(ObjectRef::new(id, gen))))
}

/// Parse an array `[ ... ]`.
fn parse_array(input: &[u8]) -> IResult<&[u8], Object> {
    let (mut rest, _) = char('[')(input)?;
    let mut items = Vec::new();
    loop {
        let (r, _) = skip_ws(rest)?;
        rest = r;
        if let Ok((r, _)) = char::<_, nom::error::Error<&[u8]>>(']')(rest) {
            return Ok((r, Object::Array(items)));
        }
        let (r, obj) = parse_object(rest)?;
        items.push(obj);
        rest = r;
    }
}

/// Parse a dictionary `<< /Key value ... >>`.
///
/// Keys must be names; a non-name where a key is expected is a parse error.
fn parse_dict(input: &[u8]) -> IResult<&[u8], Object> {
    let (mut rest, _) = tag("<<")(input)?;
    let mut dict = HashMap::new();
    loop {
        let (r, _) = skip_ws(rest)?;
        rest = r;
        if let Ok((r, _)) = tag::<_, _, nom::error::Error<&[u8]>>(">>")(rest) {
            return Ok((r, Object::Dictionary(dict)));
        }
        let (r, key) = parse_name(rest)?;
        let (r, _) = skip_ws(r)?;
        let (r, val) = parse_object(r)?;
        rest = r;
        if let Object::Name(key) = key {
            dict.insert(key, val);
        }
    }
}

/// Parse any direct PDF object, skipping leading whitespace and comments.
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (input, _) = skip_ws(input)?;
    alt((
        parse_dict,
        parse_hex_string,
        parse_literal_string,
        parse_array,
        parse_name,
        parse_keyword,
        parse_reference,
        parse_number,
    ))(input)
}

/// Parse a direct object from the start of `buf`, returning the object and
/// the number of bytes consumed (leading whitespace included).
///
/// This is the entry point used for trailer dictionaries and for member
/// objects inside object streams, where successive objects are parsed at
/// known offsets.
pub fn parse_direct(buf: &[u8]) -> Result<(Object, usize)> {
    let (after, obj) = parse_object(buf).map_err(|_| {
        Error::InvalidPdf(format!(
            "unparseable object near: {:?}",
            String::from_utf8_lossy(&buf[..buf.len().min(32)])
        ))
    })?;
    Ok((obj, buf.len() - after.len()))
}

/// Parse an indirect object (`N G obj ... endobj`) at `offset` in `buf`.
///
/// When the body is followed by the `stream` keyword, the returned
/// [`IndirectObject::stream_data_start`] is the absolute offset of the first
/// data byte (after the EOL following `stream`). The caller slices the data
/// using `/Length`, falling back to [`find_stream_end`] when the length is
/// wrong or unresolvable.
pub fn parse_indirect_at(buf: &[u8], offset: usize) -> Result<IndirectObject> {
    if offset >= buf.len() {
        return Err(Error::InvalidPdf(format!(
            "object offset {} beyond end of file ({})",
            offset,
            buf.len()
        )));
    }

    let input = &buf[offset..];
    let header_err =
        || nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit));
    let parsed: IResult<&[u8], (u32, u16, Object)> = (|| {
        let (rest, _) = skip_ws(input)?;
        let (rest, id_digits) = digit1(rest)?;
        let (rest, _) = whitespace(rest)?;
        let (rest, gen_digits) = digit1(rest)?;
        let (rest, _) = whitespace(rest)?;
        let (rest, _) = tag("obj")(rest)?;
        let (rest, obj) = parse_object(rest)?;

        let id = std::str::from_utf8(id_digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(header_err)?;
        let gen = std::str::from_utf8(gen_digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(header_err)?;
        Ok((rest, (id, gen, obj)))
    })();

    let (rest, (id, gen, object)) = parsed.map_err(|_| {
        Error::InvalidPdf(format!("unparseable indirect object at offset {}", offset))
    })?;

    let (rest, _) =
        skip_ws(rest).map_err(|_| Error::InvalidPdf("unreachable whitespace error".to_string()))?;

    // ISO 32000-1:2008, 7.3.8.1: `stream` must be followed by CRLF or LF,
    // not CR alone. Accept CR alone and a missing EOL leniently.
    let stream_data_start = if rest.starts_with(b"stream") {
        let mut pos = buf.len() - rest.len() + b"stream".len();
        match (buf.get(pos), buf.get(pos + 1)) {
            (Some(b'\r'), Some(b'\n')) => pos += 2,
            (Some(b'\n'), _) => pos += 1,
            (Some(b'\r'), _) => {
                log::warn!("object {} {}: bare CR after stream keyword, accepting", id, gen);
                pos += 1;
            },
            _ => {
                log::warn!("object {} {}: no EOL after stream keyword, accepting", id, gen);
            },
        }
        Some(pos)
    } else {
        None
    };

    Ok(IndirectObject {
        reference: ObjectRef::new(id, gen),
        object,
        stream_data_start,
    })
}

/// Find the `endstream` keyword at or after `from`, returning the offset
/// just past the stream data (backing off one preceding EOL).
///
/// Recovery path for streams whose `/Length` is wrong or unresolvable.
pub fn find_stream_end(buf: &[u8], from: usize) -> Option<usize> {
    let window = buf.get(from..)?;
    let pos = window.windows(b"endstream".len()).position(|w| w == b"endstream")?;
    let mut end = from + pos;
    if end > from && buf[end - 1] == b'\n' {
        end -= 1;
    }
    if end > from && buf[end - 1] == b'\r' {
        end -= 1;
    }
    Some(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &[u8]) -> Object {
        let (rest, obj) = parse_object(input).expect("parse failed");
        assert!(rest.is_empty(), "unconsumed input: {:?}", rest);
        obj
    }

    #[test]
    fn test_parse_integers() {
        assert_eq!(parse_ok(b"42"), Object::Integer(42));
        assert_eq!(parse_ok(b"-123"), Object::Integer(-123));
        assert_eq!(parse_ok(b"+17"), Object::Integer(17));
    }

    #[test]
    fn test_parse_reals() {
        assert_eq!(parse_ok(b"3.5"), Object::Real(3.5));
        assert_eq!(parse_ok(b"-.002"), Object::Real(-0.002));
        assert_eq!(parse_ok(b"5."), Object::Real(5.0));
    }

    #[test]
    fn test_parse_name_with_escape() {
        assert_eq!(parse_ok(b"/Type"), Object::Name("Type".to_string()));
        assert_eq!(parse_ok(b"/A#20B"), Object::Name("A B".to_string()));
    }

    #[test]
    fn test_parse_literal_string_escapes() {
        assert_eq!(parse_ok(b"(Hello)"), Object::String(b"Hello".to_vec()));
        assert_eq!(parse_ok(b"(a\\(b\\)c)"), Object::String(b"a(b)c".to_vec()));
        assert_eq!(
            parse_ok(b"(nested (parens) ok)"),
            Object::String(b"nested (parens) ok".to_vec())
        );
        assert_eq!(parse_ok(b"(\\101\\102)"), Object::String(b"AB".to_vec()));
        assert_eq!(parse_ok(b"(tab\\there)"), Object::String(b"tab\there".to_vec()));
    }

    #[test]
    fn test_parse_literal_string_line_continuation() {
        assert_eq!(parse_ok(b"(split\\\r\nline)"), Object::String(b"splitline".to_vec()));
    }

    #[test]
    fn test_parse_hex_string() {
        assert_eq!(parse_ok(b"<48656C6C6F>"), Object::String(b"Hello".to_vec()));
        // Odd digit count pads with zero
        assert_eq!(parse_ok(b"<48656C6C6F7>"), Object::String(b"Hello\x70".to_vec()));
        // Whitespace between digits is ignored
        assert_eq!(parse_ok(b"<48 65 6C>"), Object::String(b"Hel".to_vec()));
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(parse_ok(b"true"), Object::Boolean(true));
        assert_eq!(parse_ok(b"false"), Object::Boolean(false));
        assert_eq!(parse_ok(b"null"), Object::Null);
    }

    #[test]
    fn test_parse_reference_vs_integers() {
        assert_eq!(parse_ok(b"10 0 R"), Object::Reference(ObjectRef::new(10, 0)));

        // Bare integers must not be swallowed by reference lookahead
        let arr = parse_ok(b"[1 2 3 0 R 4]");
        let items = arr.as_array().unwrap().clone();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0], Object::Integer(1));
        assert_eq!(items[1], Object::Integer(2));
        assert_eq!(items[2], Object::Reference(ObjectRef::new(3, 0)));
        assert_eq!(items[3], Object::Integer(4));
    }

    #[test]
    fn test_parse_dict() {
        let obj = parse_ok(b"<< /Type /Catalog /Pages 2 0 R /Count 5 >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get("Type").unwrap().as_name(), Some("Catalog"));
        assert_eq!(dict.get("Pages").unwrap().as_reference(), Some(ObjectRef::new(2, 0)));
        assert_eq!(dict.get("Count").unwrap().as_integer(), Some(5));
    }

    #[test]
    fn test_parse_nested_structures() {
        let obj = parse_ok(b"<< /Kids [3 0 R 4 0 R] /Box [0 0 612 792.5] /Meta << /A (x) >> >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get("Kids").unwrap().as_array().unwrap().len(), 2);
        let media_box = dict.get("Box").unwrap().as_array().unwrap();
        assert_eq!(media_box[3], Object::Real(792.5));
        assert!(dict.get("Meta").unwrap().as_dict().is_some());
    }

    #[test]
    fn test_parse_with_comment() {
        let (obj, consumed) = parse_direct(b"% a comment\n42 ").unwrap();
        assert_eq!(obj, Object::Integer(42));
        assert_eq!(consumed, "% a comment\n42".len());
    }

    #[test]
    fn test_parse_empty_containers() {
        assert_eq!(parse_ok(b"[]"), Object::Array(vec![]));
        assert_eq!(parse_ok(b"<<>>"), Object::Dictionary(HashMap::new()));
    }

    #[test]
    fn test_parse_indirect_plain() {
        let buf = b"junk 7 0 obj\n<< /Type /Page >>\nendobj\n";
        let parsed = parse_indirect_at(buf, 5).unwrap();
        assert_eq!(parsed.reference, ObjectRef::new(7, 0));
        assert_eq!(parsed.object.as_dict().unwrap().get("Type").unwrap().as_name(), Some("Page"));
        assert!(parsed.stream_data_start.is_none());
    }

    #[test]
    fn test_parse_indirect_stream_header() {
        let buf = b"5 0 obj\n<< /Length 4 >>\nstream\r\nDATA\nendstream\nendobj\n";
        let parsed = parse_indirect_at(buf, 0).unwrap();
        assert_eq!(parsed.reference, ObjectRef::new(5, 0));
        let start = parsed.stream_data_start.unwrap();
        assert_eq!(&buf[start..start + 4], b"DATA");
    }

    #[test]
    fn test_find_stream_end_backs_off_eol() {
        let buf = b"stuff DATA\r\nendstream";
        assert_eq!(find_stream_end(buf, 0), Some(10));
        assert_eq!(find_stream_end(b"no keyword here", 0), None);
    }

    #[test]
    fn test_parse_indirect_bad_offset() {
        assert!(parse_indirect_at(b"short", 99).is_err());
    }

    #[test]
    fn test_unbalanced_string_fails() {
        assert!(parse_object(b"(never closed").is_err());
    }
}
