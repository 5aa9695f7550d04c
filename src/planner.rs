//! Signature placement planning.
//!
//! The planner turns a validated page/box request into a [`SignatureField`]:
//! the one value carrying everything the digest engine and the writer need
//! to know about where the signature lives and what its annotation says.

use crate::config::SigningConfig;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::identity::Identity;
use chrono::{DateTime, Utc};

/// A planned signature placement.
///
/// Page index is 0-based here; the public configuration uses 1-based pages
/// and the planner converts after validation.
#[derive(Debug, Clone)]
pub struct SignatureField {
    /// 0-based index of the page carrying the widget annotation.
    pub page_index: usize,
    /// Widget rectangle in user-space units.
    pub rect: Rect,
    /// Form field name (`/T`).
    pub field_name: String,
    /// `/Reason`, when configured.
    pub reason: Option<String>,
    /// `/Location`, when configured.
    pub location: Option<String>,
    /// `/ContactInfo`, when configured.
    pub contact: Option<String>,
    /// Lines of the visible appearance, top to bottom.
    pub display_lines: Vec<String>,
    /// The instant this operation signs at, captured exactly once.
    pub signing_time: DateTime<Utc>,
}

impl SignatureField {
    /// The signing instant as a PDF date string for the dictionary `/M`
    /// entry, e.g. `D:20260115093000+00'00'`.
    pub fn pdf_date(&self) -> String {
        format!("D:{}", self.stamp())
    }

    fn stamp(&self) -> String {
        // The instant is always UTC, so the offset is a fixed literal.
        format!("{}+00'00'", self.signing_time.format("%Y%m%d%H%M%S"))
    }
}

/// Validate the requested placement and produce a [`SignatureField`].
///
/// # Errors
///
/// * [`Error::PageOutOfRange`] — the 1-indexed page is 0 or beyond the
///   document's last page
/// * [`Error::InvalidGeometry`] — the signature box has zero or negative
///   extent on either axis
pub fn plan(
    document: &Document,
    identity: &Identity,
    config: &SigningConfig,
) -> Result<SignatureField> {
    let page_count = document.page_count();
    if config.page == 0 || config.page > page_count {
        return Err(Error::PageOutOfRange {
            requested: config.page,
            page_count,
        });
    }

    let rect = config.signature_box;
    if !rect.is_valid() {
        return Err(Error::InvalidGeometry(format!(
            "box [{} {} {} {}] must satisfy left < right and bottom < top",
            rect.left, rect.bottom, rect.right, rect.top
        )));
    }

    let signing_time = config.signing_instant();

    let mut display_lines = Vec::new();
    if let Some(label) = &config.label {
        display_lines.push(label.clone());
    }
    let signer = identity.common_name().unwrap_or("Unknown signer");
    display_lines.push(format!("Digitally signed by {}", signer));
    display_lines.push(format!(
        "Date: {}+00'00'",
        signing_time.format("%Y%m%d%H%M%S")
    ));

    let field = SignatureField {
        page_index: config.page - 1,
        rect,
        field_name: config.field_name.clone(),
        reason: config.reason.clone(),
        location: config.location.clone(),
        contact: config.contact.clone(),
        display_lines,
        signing_time,
    };

    log::debug!(
        "planned signature on page {} (field {:?})",
        config.page,
        field.field_name
    );
    Ok(field)
}
