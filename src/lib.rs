//! # pdf_signet
//!
//! Digital signing of PDF documents with PKCS#12 identities.
//!
//! The engine appends a detached CMS signature (`adbe.pkcs7.detached`,
//! ISO 32000-1:2008 section 12.8) to an existing document as an incremental
//! update: every original byte keeps its offset, and the new signature
//! dictionary, widget annotation, appearance, cross-reference section, and
//! trailer are appended after it. Signed documents can be read back and
//! verified against the embedded or a caller-supplied certificate.
//!
//! ## Quick start
//!
//! ```no_run
//! use pdf_signet::{PdfSigner, SigningConfig};
//!
//! let pdf = std::fs::read("contract.pdf")?;
//! let container = std::fs::read("signer.p12")?;
//!
//! let signer = PdfSigner::new(
//!     SigningConfig::new()
//!         .with_reason("Contract execution")
//!         .with_location("Vienna"),
//! );
//! let signed = signer.sign(&pdf, &container, "password")?;
//! std::fs::write("contract-signed.pdf", &signed)?;
//!
//! // Read it back
//! let infos = pdf_signet::verify(&signed)?;
//! assert_eq!(infos.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! Identity::load → planner::plan → writer::render_update
//!     → byterange::digest_ranges → cms::build_signed_data
//!     → byterange::fill_placeholder
//! ```
//!
//! Each operation is synchronous and self-contained: the identity is loaded
//! fresh, the output is assembled fully in memory, and an error at any stage
//! yields no partial output.

pub mod config;
pub mod document;
pub mod error;
pub mod geometry;
pub mod identity;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod planner;
pub mod signatures;
pub mod writer;
pub mod xref;

pub use config::SigningConfig;
pub use document::Document;
pub use error::{Error, Result};
pub use geometry::Rect;
pub use identity::Identity;
pub use object::{Object, ObjectRef};
pub use planner::SignatureField;
pub use signatures::{
    verify, verify_against, DigestAlgorithm, PdfSigner, SignatureInfo, SignatureSubFilter,
};
