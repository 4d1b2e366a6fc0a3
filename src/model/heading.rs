//! Document index output.

use serde::{Deserialize, Serialize};

/// A heading and the span of text it owns.
///
/// `char_start`/`char_end` are byte offsets into the document; the range is
/// half-open and extends to the next heading of equal or shallower depth.
/// Lines are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heading {
    pub section_id: String,
    pub level: u8,
    pub title: String,
    pub line_start: usize,
    pub line_end: usize,
    pub char_start: usize,
    pub char_end: usize,
}

impl Heading {
    /// Whether `[start, end)` lies entirely inside this heading's range.
    #[must_use]
    pub fn contains(&self, start: usize, end: usize) -> bool {
        start >= self.char_start && end <= self.char_end
    }
}

/// The indexed form of one markdown document.
///
/// Replaced wholesale on every reindex; never partially mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedFile {
    pub file_id: String,
    pub path: String,
    pub sha256: String,
    pub size: u64,
    pub mtime_ms: i64,
    pub headings: Vec<Heading>,
}

impl IndexedFile {
    /// Set the modification time (Unix milliseconds).
    #[must_use]
    pub fn with_mtime(mut self, mtime_ms: i64) -> Self {
        self.mtime_ms = mtime_ms;
        self
    }

    /// Look up a heading by section id.
    ///
    /// Duplicate explicit ids are legal; the last one in document order wins.
    #[must_use]
    pub fn heading(&self, section_id: &str) -> Option<&Heading> {
        find_heading(&self.headings, section_id)
    }
}

/// Last heading in `headings` carrying `section_id`.
#[must_use]
pub fn find_heading<'a>(headings: &'a [Heading], section_id: &str) -> Option<&'a Heading> {
    headings.iter().rev().find(|h| h.section_id == section_id)
}
