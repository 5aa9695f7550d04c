//! Incremental update writing.
//!
//! Everything the signing path appends to a document is produced here:
//! object serialization ([`serializer`]), the widget's visual appearance
//! ([`appearance`]), and the update assembly itself ([`incremental`]).

pub mod appearance;
pub mod incremental;
pub mod serializer;

pub use incremental::{render_update, AnnotationFlags, SigFlags, UpdateLayout};
