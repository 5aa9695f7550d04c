//! Appearance stream generation for the signature widget.
//!
//! The widget's `/AP /N` entry points at a Form XObject drawing the display
//! text (ISO 32000-1:2008, 12.5.5). The XObject's coordinate space starts at
//! the origin, sized to the signature box; the widget's `/Rect` places it on
//! the page.

use crate::geometry::Rect;
use crate::object::{Object, ObjectRef};
use crate::writer::serializer;
use std::collections::HashMap;

const FONT_SIZE: f32 = 9.0;
const LEADING: f32 = 11.0;
const MARGIN: f32 = 4.0;

/// Build the `/N` appearance Form XObject for the display text.
///
/// `font_ref` must resolve to the Helvetica font object written alongside;
/// it is registered in the XObject's own `/Resources` under `/Helv`.
pub fn build_appearance(rect: &Rect, lines: &[String], font_ref: ObjectRef) -> Object {
    let width = rect.width();
    let height = rect.height();

    let mut content = String::from("q\nBT\n");
    content.push_str(&format!("/Helv {} Tf\n0 g\n", trim_real(FONT_SIZE)));
    // First baseline sits one leading below the top edge
    content.push_str(&format!(
        "{} {} Td\n",
        trim_real(MARGIN),
        trim_real(height - LEADING)
    ));
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            content.push_str(&format!("0 -{} Td\n", trim_real(LEADING)));
        }
        content.extend(
            String::from_utf8_lossy(&serializer::serialize_string(line.as_bytes())).chars(),
        );
        content.push_str(" Tj\n");
    }
    content.push_str("ET\nQ\n");

    let resources = serializer::dict(vec![(
        "Font",
        serializer::dict(vec![("Helv", serializer::reference(font_ref))]),
    )]);

    let mut dict: HashMap<String, Object> = HashMap::new();
    dict.insert("Type".to_string(), serializer::name("XObject"));
    dict.insert("Subtype".to_string(), serializer::name("Form"));
    dict.insert(
        "BBox".to_string(),
        serializer::rect_array(&Rect::new(0.0, 0.0, width, height)),
    );
    dict.insert("Resources".to_string(), resources);

    Object::Stream {
        dict,
        data: bytes::Bytes::from(content.into_bytes()),
    }
}

/// The Helvetica font object the appearance text uses.
///
/// A standard-14 font needs no embedded program; `WinAnsiEncoding` keeps
/// the common Latin-1 range rendering predictably.
pub fn build_font() -> Object {
    serializer::dict(vec![
        ("Type", serializer::name("Font")),
        ("Subtype", serializer::name("Type1")),
        ("BaseFont", serializer::name("Helvetica")),
        ("Encoding", serializer::name("WinAnsiEncoding")),
    ])
}

fn trim_real(value: f32) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}
