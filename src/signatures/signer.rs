//! End-to-end signing orchestration.
//!
//! [`PdfSigner`] drives one operation through its stages:
//! `Idle → IdentityLoaded → Planned → DigestComputed → ContainerBuilt →
//! Written`. Any failure aborts the remaining stages; nothing is retried
//! internally and partial output is never returned. Transitions are logged
//! at debug level.

use crate::config::SigningConfig;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::planner;
use crate::signatures::{byterange, cms};
use crate::writer;
use std::io::Write;
use std::path::Path;

/// Pipeline stages of one signing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    IdentityLoaded,
    Planned,
    DigestComputed,
    ContainerBuilt,
    Written,
}

/// Signs PDF documents with a configured placement and digest policy.
///
/// One signer can run any number of operations; each operation loads its
/// identity fresh and shares no state with the others.
///
/// ```no_run
/// use pdf_signet::{PdfSigner, SigningConfig};
///
/// let signer = PdfSigner::new(SigningConfig::new().with_reason("Approved"));
/// let pdf = std::fs::read("contract.pdf")?;
/// let container = std::fs::read("signer.p12")?;
/// let signed = signer.sign(&pdf, &container, "password")?;
/// std::fs::write("contract-signed.pdf", signed)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct PdfSigner {
    config: SigningConfig,
}

impl PdfSigner {
    /// Create a signer with the given configuration.
    pub fn new(config: SigningConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &SigningConfig {
        &self.config
    }

    /// Sign a document, returning the complete signed byte stream.
    ///
    /// The first `pdf.len()` bytes of the output equal `pdf` exactly; the
    /// signature and its supporting objects are appended as an incremental
    /// update.
    pub fn sign(&self, pdf: &[u8], container: &[u8], password: &str) -> Result<Vec<u8>> {
        let mut stage = Stage::Idle;

        let identity = Identity::load(container, password)?;
        advance(&mut stage, Stage::IdentityLoaded);

        if self.config.require_full_chain && !identity.has_full_chain() {
            return Err(Error::ChainIncomplete(format!(
                "leaf certificate for {:?} is not self-signed and no issuer is present",
                identity.common_name().unwrap_or("<no CN>")
            )));
        }

        let document = Document::from_bytes(pdf.to_vec())?;
        let field = planner::plan(&document, &identity, &self.config)?;
        advance(&mut stage, Stage::Planned);

        let mut layout =
            writer::render_update(&document, &field, self.config.placeholder_hex_len)?;
        let digest = byterange::digest_ranges(
            &layout.output,
            &layout.byte_ranges,
            self.config.digest_algorithm,
        );
        advance(&mut stage, Stage::DigestComputed);

        let container_der = cms::build_signed_data(
            &digest,
            &identity,
            self.config.digest_algorithm,
            field.signing_time,
        )?;
        advance(&mut stage, Stage::ContainerBuilt);

        byterange::fill_placeholder(&mut layout.output, layout.placeholder, &container_der)?;
        advance(&mut stage, Stage::Written);

        Ok(layout.output)
    }

    /// Sign a document and write the result to `sink`.
    ///
    /// The output is assembled fully in memory first, so a sink error never
    /// leaves a partially signed file behind a successful return.
    pub fn sign_to<W: Write>(
        &self,
        pdf: &[u8],
        container: &[u8],
        password: &str,
        mut sink: W,
    ) -> Result<()> {
        let signed = self.sign(pdf, container, password)?;
        sink.write_all(&signed)?;
        sink.flush()?;
        Ok(())
    }

    /// Sign the PDF at `input` and write the signed document to `output`.
    pub fn sign_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        container: &[u8],
        password: &str,
    ) -> Result<()> {
        let pdf = std::fs::read(input)?;
        let signed = self.sign(&pdf, container, password)?;
        std::fs::write(output, signed)?;
        Ok(())
    }
}

fn advance(stage: &mut Stage, to: Stage) {
    log::debug!("signing stage: {:?} -> {:?}", stage, to);
    *stage = to;
}
