//! Signing configuration.

use crate::geometry::Rect;
use crate::signatures::DigestAlgorithm;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Options for one signing operation.
///
/// A fresh default is a complete, working configuration: page 1, a rectangle
/// in the lower-right quadrant of a letter/A4 page, SHA-256, and a generic
/// reason string. Everything is adjustable through the builder methods.
///
/// ```
/// use pdf_signet::config::SigningConfig;
/// use pdf_signet::geometry::Rect;
///
/// let config = SigningConfig::new()
///     .with_page(2)
///     .with_signature_box(Rect::new(50.0, 50.0, 300.0, 120.0))
///     .with_reason("Approved");
/// assert_eq!(config.page, 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// 1-indexed page that carries the visible signature.
    pub page: usize,

    /// Signature rectangle in user-space units.
    pub signature_box: Rect,

    /// Digest algorithm for the document hash and the CMS signature.
    pub digest_algorithm: DigestAlgorithm,

    /// `/Reason` entry of the signature dictionary.
    pub reason: Option<String>,

    /// `/Location` entry; omitted from the dictionary when unset.
    pub location: Option<String>,

    /// `/ContactInfo` entry; omitted from the dictionary when unset.
    pub contact: Option<String>,

    /// Extra leading line of the appearance text, e.g. a platform or brand
    /// name. No line is drawn when unset.
    pub label: Option<String>,

    /// Name (`/T`) of the signature form field.
    pub field_name: String,

    /// Width of the `/Contents` placeholder in hex digits.
    ///
    /// The serialized signature container must fit in half this many raw
    /// bytes; signing fails with `PlaceholderTooSmall` otherwise. The default
    /// leaves generous room for a leaf certificate plus a few chain
    /// certificates.
    pub placeholder_hex_len: usize,

    /// Refuse to sign when the identity carries a non-self-signed leaf
    /// certificate without its issuing chain.
    pub require_full_chain: bool,

    /// Fixed signing instant for reproducible output. Signing uses the
    /// current UTC time when unset.
    pub signing_time: Option<DateTime<Utc>>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SigningConfig {
    /// Create a configuration with the documented defaults.
    pub fn new() -> Self {
        Self {
            page: 1,
            signature_box: Rect::new(250.0, 5.0, 550.0, 150.0),
            digest_algorithm: DigestAlgorithm::Sha256,
            reason: Some("Signed digitally".to_string()),
            location: None,
            contact: None,
            label: None,
            field_name: "Signature1".to_string(),
            placeholder_hex_len: 16384,
            require_full_chain: false,
            signing_time: None,
        }
    }

    /// Set the 1-indexed target page.
    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    /// Set the signature rectangle.
    pub fn with_signature_box(mut self, rect: Rect) -> Self {
        self.signature_box = rect;
        self
    }

    /// Set the digest algorithm.
    pub fn with_digest_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = algorithm;
        self
    }

    /// Set the `/Reason` string.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the `/Location` string.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the `/ContactInfo` string.
    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    /// Set the leading appearance label line.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the signature field name.
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    /// Set the `/Contents` placeholder width in hex digits.
    pub fn with_placeholder_hex_len(mut self, hex_len: usize) -> Self {
        self.placeholder_hex_len = hex_len;
        self
    }

    /// Require the full certificate chain to be present before signing.
    pub fn with_require_full_chain(mut self, require: bool) -> Self {
        self.require_full_chain = require;
        self
    }

    /// Pin the signing instant instead of using the current time.
    pub fn with_signing_time(mut self, time: DateTime<Utc>) -> Self {
        self.signing_time = Some(time);
        self
    }

    /// The instant this operation signs at.
    ///
    /// Callers capture this once per operation so the dictionary `/M` value
    /// and the CMS signing-time attribute cannot drift apart.
    pub fn signing_instant(&self) -> DateTime<Utc> {
        self.signing_time.unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SigningConfig::new();
        assert_eq!(config.page, 1);
        assert_eq!(config.signature_box, Rect::new(250.0, 5.0, 550.0, 150.0));
        assert_eq!(config.digest_algorithm, DigestAlgorithm::Sha256);
        assert_eq!(config.reason.as_deref(), Some("Signed digitally"));
        assert_eq!(config.location, None);
        assert_eq!(config.contact, None);
        assert_eq!(config.field_name, "Signature1");
        assert_eq!(config.placeholder_hex_len, 16384);
        assert!(!config.require_full_chain);
        assert!(config.signing_time.is_none());
    }

    #[test]
    fn test_builder_chain() {
        let config = SigningConfig::new()
            .with_page(3)
            .with_digest_algorithm(DigestAlgorithm::Sha512)
            .with_reason("Contract execution")
            .with_location("Vienna")
            .with_contact("legal@example.com")
            .with_label("Example Corp")
            .with_field_name("Sig-2026")
            .with_placeholder_hex_len(32768)
            .with_require_full_chain(true);
        assert_eq!(config.page, 3);
        assert_eq!(config.digest_algorithm, DigestAlgorithm::Sha512);
        assert_eq!(config.reason.as_deref(), Some("Contract execution"));
        assert_eq!(config.location.as_deref(), Some("Vienna"));
        assert_eq!(config.contact.as_deref(), Some("legal@example.com"));
        assert_eq!(config.label.as_deref(), Some("Example Corp"));
        assert_eq!(config.field_name, "Sig-2026");
        assert_eq!(config.placeholder_hex_len, 32768);
        assert!(config.require_full_chain);
    }

    #[test]
    fn test_signing_instant_pinned() {
        let instant = "2026-01-15T09:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let config = SigningConfig::new().with_signing_time(instant);
        assert_eq!(config.signing_instant(), instant);
        assert_eq!(config.signing_instant(), instant);
    }

    #[test]
    fn test_serde_round_trip_with_partial_input() {
        let json = r#"{"page": 2, "digest_algorithm": "SHA-384"}"#;
        let config: SigningConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.page, 2);
        assert_eq!(config.digest_algorithm, DigestAlgorithm::Sha384);
        // Unspecified fields keep their defaults.
        assert_eq!(config.field_name, "Signature1");
        assert_eq!(config.placeholder_hex_len, 16384);

        let full = serde_json::to_string(&config).unwrap();
        let back: SigningConfig = serde_json::from_str(&full).unwrap();
        assert_eq!(back.page, config.page);
        assert_eq!(back.digest_algorithm, config.digest_algorithm);
    }
}
