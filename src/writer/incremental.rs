//! Incremental update assembly.
//!
//! Renders the signing update after the original bytes: rewritten catalog
//! and page (same object numbers), the signature dictionary, the widget
//! annotation, its appearance, a font, then a classic cross-reference
//! section and a trailer chaining to the previous one through `/Prev`
//! (ISO 32000-1:2008, 7.5.6). Every byte of the original file keeps its
//! offset; the update only appends.
//!
//! The signature dictionary is the one object rendered by hand here: the
//! exact offsets of its `/Contents` placeholder and `/ByteRange` value must
//! be known so both can be patched in place once the total length is fixed.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::planner::SignatureField;
use crate::signatures::byterange::{
    byte_ranges, render_byte_range, validate, PlaceholderSpan, BYTE_RANGE_DIGITS,
};
use crate::writer::{appearance, serializer};
use crate::xref::{render_classic_section, XrefRecord};
use bitflags::bitflags;
use std::collections::HashMap;

bitflags! {
    /// Annotation flags, ISO 32000-1:2008 Table 165.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AnnotationFlags: i64 {
        /// Render the annotation when the page is printed.
        const PRINT = 1 << 2;
    }
}

bitflags! {
    /// Interactive-form `/SigFlags`, ISO 32000-1:2008 Table 219.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SigFlags: i64 {
        /// The document contains at least one signature field.
        const SIGNATURES_EXIST = 1 << 0;
        /// Writers should only append, never rewrite.
        const APPEND_ONLY = 1 << 1;
    }
}

/// A rendered provisional update: zero-filled placeholder, final offsets.
///
/// `byte_ranges` is already patched into the output; the caller hashes the
/// covered ranges, builds the container, and fills the placeholder.
#[derive(Debug)]
pub struct UpdateLayout {
    /// Original bytes plus the full incremental update.
    pub output: Vec<u8>,
    /// The reserved `/Contents` span, delimiters included.
    pub placeholder: PlaceholderSpan,
    /// The two covered ranges of the final output.
    pub byte_ranges: [(usize, usize); 2],
}

/// Render the incremental update for a planned signature.
///
/// `placeholder_hex_len` is the width of the `/Contents` hex interior. The
/// returned layout satisfies the covering invariant
/// `sum(lengths) + placeholder_length == total`.
pub fn render_update(
    document: &Document,
    field: &SignatureField,
    placeholder_hex_len: usize,
) -> Result<UpdateLayout> {
    let mut numbers = Allocator::new(document.next_object_number());
    let sig_ref = numbers.next();
    let widget_ref = numbers.next();
    let appearance_ref = numbers.next();
    let font_ref = numbers.next();

    let mut output = document.bytes().to_vec();
    // The update must start on a fresh line
    if output.last() != Some(&b'\n') {
        output.push(b'\n');
    }

    let mut records: Vec<XrefRecord> = Vec::new();
    fn emit(
        records: &mut Vec<XrefRecord>,
        output: &mut Vec<u8>,
        reference: ObjectRef,
        obj: &Object,
    ) {
        records.push(XrefRecord {
            number: reference.id,
            offset: output.len() as u64,
            generation: reference.gen,
        });
        output.extend_from_slice(&serializer::serialize_indirect(reference, obj));
    }

    // Catalog and AcroForm. Three shapes to handle: no /AcroForm yet, an
    // indirect /AcroForm (rewritten under its own number, catalog
    // untouched), and a direct /AcroForm dictionary (catalog rewritten).
    let catalog_ref = document.catalog_ref()?;
    let mut catalog = document.catalog_dict()?;
    match catalog.get("AcroForm").cloned() {
        None => {
            let form_ref = numbers.next();
            let form = build_acroform(document, &HashMap::new(), widget_ref)?;
            emit(&mut records, &mut output, form_ref, &form);
            catalog.insert("AcroForm".to_string(), serializer::reference(form_ref));
            emit(&mut records, &mut output, catalog_ref, &Object::Dictionary(catalog));
        },
        Some(Object::Reference(form_ref)) => {
            let existing = document
                .load_object(form_ref)?
                .as_dict()
                .cloned()
                .ok_or_else(|| Error::InvalidPdf("/AcroForm is not a dictionary".to_string()))?;
            let form = build_acroform(document, &existing, widget_ref)?;
            emit(&mut records, &mut output, form_ref, &form);
        },
        Some(Object::Dictionary(existing)) => {
            let form = build_acroform(document, &existing, widget_ref)?;
            catalog.insert("AcroForm".to_string(), form);
            emit(&mut records, &mut output, catalog_ref, &Object::Dictionary(catalog));
        },
        Some(other) => {
            return Err(Error::InvalidPdf(format!(
                "/AcroForm is a {}",
                other.type_name()
            )));
        },
    }

    // Page /Annots: append the widget; an indirect array is rewritten under
    // its own number so the page object stays untouched.
    let (page_ref, mut page) = document.page(field.page_index)?;
    match page.get("Annots").cloned() {
        Some(Object::Reference(annots_ref)) => {
            let mut annots = document
                .load_object(annots_ref)?
                .as_array()
                .cloned()
                .ok_or_else(|| Error::InvalidPdf("/Annots is not an array".to_string()))?;
            annots.push(serializer::reference(widget_ref));
            emit(&mut records, &mut output, annots_ref, &Object::Array(annots));
        },
        Some(Object::Array(mut annots)) => {
            annots.push(serializer::reference(widget_ref));
            page.insert("Annots".to_string(), Object::Array(annots));
            emit(&mut records, &mut output, page_ref, &Object::Dictionary(page));
        },
        None => {
            page.insert(
                "Annots".to_string(),
                Object::Array(vec![serializer::reference(widget_ref)]),
            );
            emit(&mut records, &mut output, page_ref, &Object::Dictionary(page));
        },
        Some(other) => {
            return Err(Error::InvalidPdf(format!("/Annots is a {}", other.type_name())));
        },
    }

    // Signature dictionary, rendered by hand to learn the patch offsets
    records.push(XrefRecord {
        number: sig_ref.id,
        offset: output.len() as u64,
        generation: 0,
    });
    let (placeholder, byte_range_offset) =
        render_signature_dict(&mut output, sig_ref, field, placeholder_hex_len);

    let widget = build_widget(field, page_ref, sig_ref, appearance_ref);
    emit(&mut records, &mut output, widget_ref, &widget);

    let ap = appearance::build_appearance(&field.rect, &field.display_lines, font_ref);
    emit(&mut records, &mut output, appearance_ref, &ap);
    emit(&mut records, &mut output, font_ref, &appearance::build_font());

    // Cross-reference section and trailer
    let xref_offset = output.len() as u64;
    output.extend_from_slice(&render_classic_section(&records));
    output.extend_from_slice(b"trailer\n");
    let trailer = build_trailer(document, catalog_ref, numbers.high_water());
    output.extend_from_slice(&serializer::serialize(&Object::Dictionary(trailer)));
    output.extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes());

    // Total length is now fixed: compute the ranges and patch them in
    let ranges = byte_ranges(output.len(), placeholder);
    validate(&ranges, placeholder, output.len())?;
    let rendered = render_byte_range(&ranges);
    output[byte_range_offset..byte_range_offset + rendered.len()]
        .copy_from_slice(rendered.as_bytes());

    log::debug!(
        "rendered incremental update: {} new object(s), {} total bytes",
        records.len(),
        output.len()
    );
    Ok(UpdateLayout { output, placeholder, byte_ranges: ranges })
}

/// Hand-render the signature dictionary, returning the placeholder span and
/// the absolute offset of the `/ByteRange` value.
///
/// Keys appear in sorted order, matching the serializer's convention. The
/// `/ByteRange` value is written zero-filled at its final fixed width so
/// patching it later shifts nothing.
fn render_signature_dict(
    output: &mut Vec<u8>,
    sig_ref: ObjectRef,
    field: &SignatureField,
    placeholder_hex_len: usize,
) -> (PlaceholderSpan, usize) {
    output.extend_from_slice(format!("{} {} obj\n", sig_ref.id, sig_ref.gen).as_bytes());
    output.extend_from_slice(b"<< /ByteRange ");

    let byte_range_offset = output.len();
    let zeros = "0".repeat(BYTE_RANGE_DIGITS);
    output.extend_from_slice(format!("[{z} {z} {z} {z}]", z = zeros).as_bytes());

    if let Some(contact) = &field.contact {
        output.extend_from_slice(b" /ContactInfo ");
        output.extend_from_slice(&serializer::serialize_string(contact.as_bytes()));
    }

    output.extend_from_slice(b" /Contents ");
    let placeholder = PlaceholderSpan {
        start: output.len(),
        len: placeholder_hex_len + 2,
    };
    output.push(b'<');
    output.extend(std::iter::repeat(b'0').take(placeholder_hex_len));
    output.push(b'>');

    output.extend_from_slice(b" /Filter /Adobe.PPKLite");

    if let Some(location) = &field.location {
        output.extend_from_slice(b" /Location ");
        output.extend_from_slice(&serializer::serialize_string(location.as_bytes()));
    }

    output.extend_from_slice(b" /M ");
    output.extend_from_slice(&serializer::serialize_string(field.pdf_date().as_bytes()));

    if let Some(reason) = &field.reason {
        output.extend_from_slice(b" /Reason ");
        output.extend_from_slice(&serializer::serialize_string(reason.as_bytes()));
    }

    output.extend_from_slice(b" /SubFilter /adbe.pkcs7.detached /Type /Sig >>\nendobj\n");
    (placeholder, byte_range_offset)
}

/// Merge the widget into an AcroForm dictionary, preserving existing fields.
fn build_acroform(
    document: &Document,
    existing: &HashMap<String, Object>,
    widget_ref: ObjectRef,
) -> Result<Object> {
    let mut form = existing.clone();

    let mut fields = match document.resolved_entry(existing, "Fields")? {
        Some(Object::Array(fields)) => fields,
        Some(other) => {
            return Err(Error::InvalidPdf(format!(
                "/AcroForm /Fields is a {}",
                other.type_name()
            )));
        },
        None => Vec::new(),
    };
    fields.push(serializer::reference(widget_ref));
    form.insert("Fields".to_string(), Object::Array(fields));

    let mut flags = SigFlags::SIGNATURES_EXIST | SigFlags::APPEND_ONLY;
    if let Some(Object::Integer(existing_flags)) = existing.get("SigFlags") {
        flags |= SigFlags::from_bits_truncate(*existing_flags);
    }
    form.insert("SigFlags".to_string(), serializer::integer(flags.bits()));

    Ok(Object::Dictionary(form))
}

/// The widget annotation doubling as the signature form field.
fn build_widget(
    field: &SignatureField,
    page_ref: ObjectRef,
    sig_ref: ObjectRef,
    appearance_ref: ObjectRef,
) -> Object {
    serializer::dict(vec![
        ("Type", serializer::name("Annot")),
        ("Subtype", serializer::name("Widget")),
        ("FT", serializer::name("Sig")),
        ("T", serializer::string(&field.field_name)),
        ("F", serializer::integer(AnnotationFlags::PRINT.bits())),
        ("Rect", serializer::rect_array(&field.rect)),
        ("V", serializer::reference(sig_ref)),
        ("P", serializer::reference(page_ref)),
        (
            "AP",
            serializer::dict(vec![("N", serializer::reference(appearance_ref))]),
        ),
    ])
}

/// Trailer for the update: new `/Size`, `/Prev` chain, `/Root`, and the
/// original `/Info` and `/ID` carried forward when present.
fn build_trailer(
    document: &Document,
    catalog_ref: ObjectRef,
    highest_number: u32,
) -> HashMap<String, Object> {
    let mut trailer: HashMap<String, Object> = HashMap::new();
    trailer.insert(
        "Size".to_string(),
        serializer::integer(i64::from(highest_number) + 1),
    );
    trailer.insert("Root".to_string(), serializer::reference(catalog_ref));
    trailer.insert(
        "Prev".to_string(),
        serializer::integer(document.startxref() as i64),
    );
    for key in ["Info", "ID"] {
        if let Some(value) = document.trailer().get(key) {
            trailer.insert(key.to_string(), value.clone());
        }
    }
    trailer
}

/// Sequential object-number allocation for the update.
struct Allocator {
    next: u32,
    first: u32,
}

impl Allocator {
    fn new(first: u32) -> Self {
        Self { next: first, first }
    }

    fn next(&mut self) -> ObjectRef {
        let number = self.next;
        self.next += 1;
        ObjectRef::new(number, 0)
    }

    /// Highest number handed out so far.
    fn high_water(&self) -> u32 {
        debug_assert!(self.next > self.first);
        self.next - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    fn field() -> SignatureField {
        SignatureField {
            page_index: 0,
            rect: Rect::new(250.0, 5.0, 550.0, 150.0),
            field_name: "Signature1".to_string(),
            reason: Some("Signed digitally".to_string()),
            location: None,
            contact: None,
            display_lines: vec!["Digitally signed by Test".to_string()],
            signing_time: "2026-01-15T09:30:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn test_signature_dict_offsets() {
        let mut out = Vec::new();
        let (span, br_offset) = render_signature_dict(&mut out, ObjectRef::new(9, 0), &field(), 64);

        assert_eq!(out[span.start], b'<');
        assert_eq!(out[span.start + span.len - 1], b'>');
        assert_eq!(span.len, 66);
        assert!(out[span.start + 1..span.start + span.len - 1]
            .iter()
            .all(|&b| b == b'0'));

        let rendered = render_byte_range(&[(0, 123), (456, 789)]);
        assert_eq!(
            out[br_offset..br_offset + rendered.len()].len(),
            rendered.len()
        );
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("/Filter /Adobe.PPKLite"));
        assert!(text.contains("/SubFilter /adbe.pkcs7.detached"));
        assert!(text.contains("/M (D:20260115093000+00'00')"));
    }

    #[test]
    fn test_widget_carries_links() {
        let widget = build_widget(
            &field(),
            ObjectRef::new(3, 0),
            ObjectRef::new(9, 0),
            ObjectRef::new(11, 0),
        );
        let dict = widget.as_dict().unwrap();
        assert_eq!(dict.get("FT").unwrap().as_name(), Some("Sig"));
        assert_eq!(
            dict.get("V").unwrap().as_reference(),
            Some(ObjectRef::new(9, 0))
        );
        assert_eq!(
            dict.get("P").unwrap().as_reference(),
            Some(ObjectRef::new(3, 0))
        );
        assert_eq!(dict.get("F").unwrap().as_integer(), Some(4));
    }

    #[test]
    fn test_sig_flags_value() {
        let flags = SigFlags::SIGNATURES_EXIST | SigFlags::APPEND_ONLY;
        assert_eq!(flags.bits(), 3);
    }
}
