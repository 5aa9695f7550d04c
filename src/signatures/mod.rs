//! Digital signing and verification.
//!
//! The signing path composes five stages: load the identity, plan the
//! placement, render the incremental update with a reserved placeholder,
//! hash the covered byte ranges, then build and embed the CMS container
//! (ISO 32000-1:2008 section 12.8, `adbe.pkcs7.detached`). [`PdfSigner`]
//! drives the whole pipeline; [`verify`] and [`verify_against`] read a
//! signed document back and check it.

pub mod byterange;
pub mod cms;
mod signer;
mod types;
mod verify;

pub use byterange::PlaceholderSpan;
pub use signer::PdfSigner;
pub use types::{DigestAlgorithm, SignatureInfo, SignatureSubFilter};
pub use verify::{verify, verify_against};
