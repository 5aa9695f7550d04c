//! Serialization of PDF objects into their byte representation.
//!
//! Follows the syntax rules of ISO 32000-1:2008 section 7.3. Dictionary
//! keys are written in sorted order so output is deterministic, which the
//! incremental writer relies on when it precomputes offsets.

use crate::geometry::Rect;
use crate::object::{Object, ObjectRef};
use std::collections::HashMap;
use std::io::Write;

/// Serialize an object to bytes.
pub fn serialize(obj: &Object) -> Vec<u8> {
    let mut buf = Vec::new();
    write_object(&mut buf, obj).expect("write to Vec");
    buf
}

/// Serialize an indirect object definition.
///
/// Format: `{id} {gen} obj\n{object}\nendobj\n`
pub fn serialize_indirect(reference: ObjectRef, obj: &Object) -> Vec<u8> {
    let mut buf = Vec::new();
    writeln!(buf, "{} {} obj", reference.id, reference.gen).expect("write to Vec");
    write_object(&mut buf, obj).expect("write to Vec");
    write!(buf, "\nendobj\n").expect("write to Vec");
    buf
}

fn write_object<W: Write>(w: &mut W, obj: &Object) -> std::io::Result<()> {
    match obj {
        Object::Null => write!(w, "null"),
        Object::Boolean(b) => write!(w, "{}", if *b { "true" } else { "false" }),
        Object::Integer(i) => write!(w, "{}", i),
        Object::Real(r) => write_real(w, *r),
        Object::String(s) => w.write_all(&serialize_string(s)),
        Object::Name(n) => w.write_all(&serialize_name(n)),
        Object::Array(arr) => write_array(w, arr),
        Object::Dictionary(dict) => write_dictionary(w, dict),
        Object::Stream { dict, data } => write_stream(w, dict, data),
        Object::Reference(r) => write!(w, "{} {} R", r.id, r.gen),
    }
}

/// Reals keep at most five decimals and drop trailing zeros; whole values
/// are written as integers.
fn write_real<W: Write>(w: &mut W, value: f64) -> std::io::Result<()> {
    if value.fract() == 0.0 {
        write!(w, "{}", value as i64)
    } else {
        let formatted = format!("{:.5}", value);
        write!(w, "{}", formatted.trim_end_matches('0').trim_end_matches('.'))
    }
}

/// A string object: literal `(...)` syntax with escapes for printable
/// content, hex `<...>` otherwise.
pub fn serialize_string(data: &[u8]) -> Vec<u8> {
    let printable = data
        .iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

    let mut out = Vec::with_capacity(data.len() + 2);
    if printable {
        out.push(b'(');
        for &byte in data {
            match byte {
                b'(' => out.extend_from_slice(b"\\("),
                b')' => out.extend_from_slice(b"\\)"),
                b'\\' => out.extend_from_slice(b"\\\\"),
                b'\n' => out.extend_from_slice(b"\\n"),
                b'\r' => out.extend_from_slice(b"\\r"),
                b'\t' => out.extend_from_slice(b"\\t"),
                _ => out.push(byte),
            }
        }
        out.push(b')');
    } else {
        out.push(b'<');
        for byte in data {
            out.extend_from_slice(format!("{:02X}", byte).as_bytes());
        }
        out.push(b'>');
    }
    out
}

/// A name object: leading `/`, with `#xx` escapes for delimiters and
/// non-regular characters.
pub fn serialize_name(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 1);
    out.push(b'/');
    for byte in name.bytes() {
        let regular = matches!(byte,
            b'!' | b'"' | b'$'..=b'&' | b'\''..=b'.' | b'0'..=b'9' | b';'
            | b'<' | b'>' | b'?' | b'@' | b'A'..=b'Z' | b'^'..=b'z' | b'|' | b'~');
        if regular {
            out.push(byte);
        } else {
            out.extend_from_slice(format!("#{:02X}", byte).as_bytes());
        }
    }
    out
}

fn write_array<W: Write>(w: &mut W, arr: &[Object]) -> std::io::Result<()> {
    write!(w, "[")?;
    for (i, obj) in arr.iter().enumerate() {
        if i > 0 {
            write!(w, " ")?;
        }
        write_object(w, obj)?;
    }
    write!(w, "]")
}

fn write_dictionary<W: Write>(w: &mut W, dict: &HashMap<String, Object>) -> std::io::Result<()> {
    write!(w, "<<")?;
    let mut keys: Vec<_> = dict.keys().collect();
    keys.sort();
    for key in keys {
        if let Some(value) = dict.get(key) {
            write!(w, " ")?;
            w.write_all(&serialize_name(key))?;
            write!(w, " ")?;
            write_object(w, value)?;
        }
    }
    write!(w, " >>")
}

fn write_stream<W: Write>(
    w: &mut W,
    dict: &HashMap<String, Object>,
    data: &[u8],
) -> std::io::Result<()> {
    let mut with_length = dict.clone();
    with_length
        .entry("Length".to_string())
        .or_insert(Object::Integer(data.len() as i64));
    write_dictionary(w, &with_length)?;
    write!(w, "\nstream\n")?;
    w.write_all(data)?;
    write!(w, "\nendstream")
}

/// Shorthand constructors used when assembling update objects.
pub fn name(s: &str) -> Object {
    Object::Name(s.to_string())
}

pub fn string(s: &str) -> Object {
    Object::String(s.as_bytes().to_vec())
}

pub fn integer(i: i64) -> Object {
    Object::Integer(i)
}

pub fn array(items: Vec<Object>) -> Object {
    Object::Array(items)
}

pub fn dict(entries: Vec<(&str, Object)>) -> Object {
    Object::Dictionary(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

pub fn reference(r: ObjectRef) -> Object {
    Object::Reference(r)
}

/// A `/Rect` value: `[left bottom right top]`.
pub fn rect_array(rect: &Rect) -> Object {
    Object::Array(vec![
        Object::Real(f64::from(rect.left)),
        Object::Real(f64::from(rect.bottom)),
        Object::Real(f64::from(rect.right)),
        Object::Real(f64::from(rect.top)),
    ])
}
