//! Document indexing.
//!
//! - [`parser`] - Heading scanner over raw markdown
//! - [`document`] - Heading ranges, section ids and fingerprints
//! - [`catalog`] - In-memory path → `IndexedFile` map

pub mod catalog;
pub mod document;
pub mod parser;

pub use catalog::Catalog;
pub use document::{LineTable, file_id, index, read_document, slugify};
