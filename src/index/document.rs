//! Markdown document → [`IndexedFile`].
//!
//! Indexing is pure: the same text and path always produce the same
//! headings, ids and fingerprint. Only [`read_document`] touches the
//! filesystem, and it does so through the [`PathGuard`].

use std::fs;
use std::time::UNIX_EPOCH;

use super::parser::{self, RawHeading};
use crate::error::{Error, Result};
use crate::model::{Heading, IndexedFile};
use crate::path_guard::PathGuard;
use crate::store::hash;

/// Hex length of the `fileId` derived from the document path.
const FILE_ID_LEN: usize = 16;

/// Hex length of the hash suffix on derived section ids.
const SECTION_HASH_LEN: usize = 8;

/// Byte offsets of the start of each line.
#[derive(Debug, Clone)]
pub struct LineTable {
    starts: Vec<usize>,
}

impl LineTable {
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut starts = Vec::new();
        if !text.is_empty() {
            starts.push(0);
            starts.extend(
                text.match_indices('\n')
                    .map(|(i, _)| i + 1)
                    .filter(|&i| i < text.len()),
            );
        }
        Self { starts }
    }

    /// Number of lines. A trailing newline does not open a new line.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// 1-based line containing byte `offset`.
    #[must_use]
    pub fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&s| s <= offset).max(1)
    }
}

/// Index a markdown document.
///
/// `mtimeMs` is left at 0; callers set it from [`read_document`].
#[must_use]
pub fn index(markdown: &str, path: &str) -> IndexedFile {
    let lines = LineTable::new(markdown);
    let raw = parser::scan_headings(markdown);

    let mut headings: Vec<Heading> = raw
        .into_iter()
        .map(|h| to_heading(h, path))
        .collect();
    close_ranges(&mut headings, &lines, markdown.len());

    IndexedFile {
        file_id: file_id(path),
        path: path.to_string(),
        sha256: hash::sha256_hex(markdown.as_bytes()),
        size: markdown.len() as u64,
        mtime_ms: 0,
        headings,
    }
}

/// Read a project-relative document and its mtime (Unix milliseconds).
///
/// # Errors
///
/// Returns `PATH_OUTSIDE_ROOT` from the guard, `NOT_FOUND` if the file does
/// not exist, `INVALID_ARGUMENT` if it is not UTF-8, or an I/O error.
pub fn read_document(guard: &PathGuard, rel_path: &str) -> Result<(String, i64)> {
    let abs = guard.resolve(rel_path)?;
    let bytes = match fs::read(&abs) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::DocumentNotFound {
                path: rel_path.to_string(),
            });
        }
        Err(e) => return Err(Error::Io(e)),
    };
    let text = String::from_utf8(bytes)
        .map_err(|_| Error::InvalidArgument(format!("{rel_path} is not valid UTF-8")))?;

    let mtime_ms = fs::metadata(&abs)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_millis()).ok())
        .unwrap_or(0);

    Ok((text, mtime_ms))
}

/// Stable id for a document path.
#[must_use]
pub fn file_id(path: &str) -> String {
    hash::short_hash(path.as_bytes(), FILE_ID_LEN)
}

/// Lowercase, alphanumeric runs joined by `-`.
#[must_use]
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<&str>>()
        .join("-")
}

/// Split a trailing `{#id}` token off a heading's text.
fn split_explicit_id(text: &str) -> (String, Option<String>) {
    let trimmed = text.trim_end();
    if let Some(inner) = trimmed.strip_suffix('}')
        && let Some(open) = inner.rfind("{#")
    {
        let id = &inner[open + 2..];
        if !id.is_empty() && !id.chars().any(|c| c.is_whitespace() || c == '{' || c == '}') {
            let title = inner[..open].trim_end().to_string();
            return (title, Some(id.to_string()));
        }
    }
    (trimmed.to_string(), None)
}

/// `slug(title)-hash(path:lineStart)`. Shifts when the heading moves lines.
fn derived_section_id(title: &str, path: &str, line_start: usize) -> String {
    let slug = slugify(title);
    let slug = if slug.is_empty() { "section".to_string() } else { slug };
    let suffix = hash::short_hash(format!("{path}:{line_start}").as_bytes(), SECTION_HASH_LEN);
    format!("{slug}-{suffix}")
}

fn to_heading(raw: RawHeading, path: &str) -> Heading {
    let (title, explicit) = split_explicit_id(&raw.text);
    let section_id = explicit.unwrap_or_else(|| derived_section_id(&title, path, raw.line));

    Heading {
        section_id,
        level: raw.level,
        title,
        line_start: raw.line,
        line_end: raw.line,
        char_start: raw.offset,
        char_end: raw.offset,
    }
}

/// Close each heading's range at the next heading of equal or shallower
/// depth, or at the document end.
fn close_ranges(headings: &mut [Heading], lines: &LineTable, doc_len: usize) {
    for i in 0..headings.len() {
        let level = headings[i].level;
        let next = headings[i + 1..].iter().find(|h| h.level <= level);
        let (char_end, line_end) = match next {
            Some(h) => (h.char_start, h.line_start - 1),
            None => (doc_len, lines.line_count()),
        };
        headings[i].char_end = char_end;
        headings[i].line_end = line_end;
    }
}
