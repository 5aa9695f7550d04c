//! Error types for the signing engine.
//!
//! Every failure is terminal for the current signing operation: nothing here
//! is transient, so there are no internal retries. Callers decide whether to
//! re-run the pipeline with corrected inputs.

/// Result type alias for signing engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while loading an identity, planning a
/// signature, digesting, building the signature container, or writing the
/// incremental update.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The password does not decrypt the identity container
    #[error("invalid credentials: password does not decrypt the identity container")]
    InvalidCredentials,

    /// The identity container decrypted but lacks a usable key/certificate
    #[error("malformed identity container: {0}")]
    MalformedIdentity(String),

    /// The container or key uses an algorithm the engine cannot handle
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Requested signature page is outside the document
    #[error("page {requested} out of range: document has {page_count} page(s)")]
    PageOutOfRange {
        /// 1-indexed page requested by the caller
        requested: usize,
        /// Number of pages in the document
        page_count: usize,
    },

    /// Signature box is degenerate (zero or negative extent)
    #[error("invalid signature box geometry: {0}")]
    InvalidGeometry(String),

    /// The real signature container exceeds the reserved placeholder
    #[error("signature placeholder too small: container needs {needed} bytes, placeholder holds {capacity}")]
    PlaceholderTooSmall {
        /// Raw container size in bytes
        needed: usize,
        /// Placeholder capacity in raw bytes (hex width / 2)
        capacity: usize,
    },

    /// Input document has zero length
    #[error("input document is empty")]
    EmptyDocument,

    /// Structural parsing found no trailer/startxref anchor
    #[error("truncated PDF: {0}")]
    TruncatedPdf(String),

    /// Private-key operation failed
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Policy requires a full certificate chain but only the leaf is present
    #[error("certificate chain incomplete: {0}")]
    ChainIncomplete(String),

    /// Underlying I/O failure while reading input or emitting output
    #[error("i/o failure: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// Input document is encrypted; signing encrypted files is unsupported
    #[error("input document is encrypted")]
    EncryptedDocument,

    /// Structurally present but malformed PDF construct
    #[error("invalid PDF: {0}")]
    InvalidPdf(String),
}
