//! Versioned field schemas
//!
//! Schema documents describe where every editable field lives inside a
//! record: byte offset, bit offset, bit width, type, and semantic extras.
//! Each record carries payloads for several game versions; loading
//! materializes exactly one version into an immutable [`SchemaIndex`].

mod field;
mod repository;

pub use field::{FieldDescriptor, FieldKind, TextEncoding, normalize_name};
pub use repository::{ParseReport, SchemaIndex, SchemaRepository, SkippedField};
