//! Quote-anchor resolution.
//!
//! An [`AnchorV1`] carries no offsets. Resolution finds every literal
//! occurrence of the quote and then narrows, never widens, the candidate
//! set: first by the hinted section, then by the text immediately before
//! and after the match. Failure to pin down a single location is returned
//! as an [`AnchorMatch`] value, not an error.

use crate::error::{Error, Result};
use crate::model::heading::find_heading;
use crate::model::{AnchorMatch, AnchorV1, Heading};

/// Characters of context captured on each side by [`build_anchor`].
pub const CONTEXT_CHARS: usize = 32;

/// Relocate `anchor` in `text`.
///
/// Offsets in the result are byte offsets into `text`.
#[must_use]
pub fn resolve(text: &str, headings: &[Heading], anchor: &AnchorV1) -> AnchorMatch {
    let quote = anchor.quote.as_str();
    if quote.is_empty() {
        return AnchorMatch::Missing;
    }

    let occurrences: Vec<usize> = text.match_indices(quote).map(|(i, _)| i).collect();
    let ok = |start: usize| AnchorMatch::Ok {
        start,
        end: start + quote.len(),
    };

    match occurrences.as_slice() {
        [] => return AnchorMatch::Missing,
        [only] => return ok(*only),
        _ => {}
    }

    let mut candidates = occurrences;

    if let Some(heading) = anchor
        .section_id
        .as_deref()
        .and_then(|id| find_heading(headings, id))
    {
        let in_section: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&start| heading.contains(start, start + quote.len()))
            .collect();
        if let [only] = in_section.as_slice() {
            return ok(*only);
        }
        if !in_section.is_empty() {
            candidates = in_section;
        }
    }

    if anchor.prefix.is_some() || anchor.suffix.is_some() {
        let by_context: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&start| context_matches(text, start, start + quote.len(), anchor))
            .collect();
        if let [only] = by_context.as_slice() {
            return ok(*only);
        }
        if !by_context.is_empty() {
            candidates = by_context;
        }
    }

    AnchorMatch::Ambiguous {
        candidates: candidates.len(),
    }
}

/// Whether the bytes around `[start, end)` equal the anchor's prefix/suffix.
fn context_matches(text: &str, start: usize, end: usize, anchor: &AnchorV1) -> bool {
    let bytes = text.as_bytes();

    let prefix_ok = anchor.prefix.as_deref().is_none_or(|prefix| {
        start
            .checked_sub(prefix.len())
            .is_some_and(|from| &bytes[from..start] == prefix.as_bytes())
    });
    let suffix_ok = anchor.suffix.as_deref().is_none_or(|suffix| {
        bytes
            .get(end..end + suffix.len())
            .is_some_and(|window| window == suffix.as_bytes())
    });

    prefix_ok && suffix_ok
}

/// Deepest heading whose range contains `[start, end)`.
#[must_use]
pub fn innermost_heading(headings: &[Heading], start: usize, end: usize) -> Option<&Heading> {
    headings
        .iter()
        .filter(|h| h.contains(start, end))
        .max_by_key(|h| (h.level, h.char_start))
}

/// Build an anchor for the selection `[start, end)` of `text`.
///
/// Captures up to [`CONTEXT_CHARS`] characters of prefix and suffix and the
/// innermost containing heading as the section hint.
///
/// # Errors
///
/// Returns `INVALID_ARGUMENT` if the range is empty, out of bounds, or not
/// on character boundaries.
pub fn build_anchor(text: &str, headings: &[Heading], start: usize, end: usize) -> Result<AnchorV1> {
    if start >= end
        || end > text.len()
        || !text.is_char_boundary(start)
        || !text.is_char_boundary(end)
    {
        return Err(Error::InvalidArgument(format!(
            "selection {start}..{end} is not a valid range of the document"
        )));
    }

    let prefix_start = text[..start]
        .char_indices()
        .rev()
        .nth(CONTEXT_CHARS - 1)
        .map_or(0, |(i, _)| i);
    let suffix_end = text[end..]
        .char_indices()
        .nth(CONTEXT_CHARS)
        .map_or(text.len(), |(i, _)| end + i);

    let mut anchor = AnchorV1::quote(&text[start..end]);
    if prefix_start < start {
        anchor = anchor.with_prefix(&text[prefix_start..start]);
    }
    if suffix_end > end {
        anchor = anchor.with_suffix(&text[end..suffix_end]);
    }
    if let Some(heading) = innermost_heading(headings, start, end) {
        anchor = anchor.with_section(heading.section_id.clone());
    }
    Ok(anchor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::index;

    fn slice(text: &str, m: AnchorMatch) -> &str {
        let (start, end) = m.range().unwrap();
        &text[start..end]
    }

    #[test]
    fn test_unique_quote() {
        let text = "Hello world\nHello again\n";
        let m = resolve(text, &[], &AnchorV1::quote("world"));
        assert_eq!(m, AnchorMatch::Ok { start: 6, end: 11 });
        assert_eq!(slice(text, m), "world");
    }

    #[test]
    fn test_ambiguous_quote() {
        let m = resolve("foo bar foo bar", &[], &AnchorV1::quote("foo"));
        assert_eq!(m, AnchorMatch::Ambiguous { candidates: 2 });
    }

    #[test]
    fn test_missing_and_empty_quote() {
        assert_eq!(
            resolve("abc", &[], &AnchorV1::quote("xyz")),
            AnchorMatch::Missing
        );
        assert_eq!(resolve("abc", &[], &AnchorV1::quote("")), AnchorMatch::Missing);
    }

    #[test]
    fn test_occurrences_do_not_overlap() {
        let m = resolve("aaaa", &[], &AnchorV1::quote("aa"));
        assert_eq!(m, AnchorMatch::Ambiguous { candidates: 2 });
    }

    #[test]
    fn test_section_narrowing() {
        let text = "# One {#one}\nship it\n# Two {#two}\nship it\n";
        let file = index(text, "plan/a.md");

        let m = resolve(
            text,
            &file.headings,
            &AnchorV1::quote("ship it").with_section("two"),
        );
        let (start, _) = m.range().unwrap();
        assert!(start > file.heading("two").unwrap().char_start);
    }

    #[test]
    fn test_unknown_section_falls_back_to_all() {
        let text = "x y x";
        let m = resolve(text, &[], &AnchorV1::quote("x").with_section("gone"));
        assert_eq!(m, AnchorMatch::Ambiguous { candidates: 2 });
    }

    #[test]
    fn test_prefix_and_suffix_narrowing() {
        let text = "a foo b foo c foo b";
        let by_prefix = resolve(text, &[], &AnchorV1::quote("foo").with_prefix("c "));
        assert_eq!(by_prefix, AnchorMatch::Ok { start: 14, end: 17 });

        let by_suffix = resolve(text, &[], &AnchorV1::quote("foo").with_suffix(" c"));
        assert_eq!(by_suffix, AnchorMatch::Ok { start: 8, end: 11 });

        let still = resolve(text, &[], &AnchorV1::quote("foo").with_suffix(" b"));
        assert_eq!(still, AnchorMatch::Ambiguous { candidates: 2 });
    }

    #[test]
    fn test_non_matching_context_keeps_previous_candidates() {
        let text = "# A {#a}\nfoo foo\n# B {#b}\nfoo\n";
        let file = index(text, "plan/a.md");
        let anchor = AnchorV1::quote("foo").with_section("a").with_prefix("zzz");
        assert_eq!(
            resolve(text, &file.headings, &anchor),
            AnchorMatch::Ambiguous { candidates: 2 }
        );
    }

    #[test]
    fn test_context_at_document_edges() {
        let text = "foo foo";
        let anchor = AnchorV1::quote("foo").with_prefix("long prefix ");
        assert_eq!(
            resolve(text, &[], &anchor),
            AnchorMatch::Ambiguous { candidates: 2 }
        );
        let anchor = AnchorV1::quote("foo").with_suffix(" foo");
        assert_eq!(resolve(text, &[], &anchor), AnchorMatch::Ok { start: 0, end: 3 });
    }

    #[test]
    fn test_multibyte_context_never_panics() {
        let text = "é foo ü foo";
        let anchor = AnchorV1::quote("foo").with_prefix("ü ");
        assert!(resolve(text, &[], &anchor).is_ok());
        let anchor = AnchorV1::quote("foo").with_prefix("\u{a9}");
        assert!(!resolve(text, &[], &anchor).is_ok());
    }

    #[test]
    fn test_build_anchor_round_trips() {
        let text = "# Plan {#plan}\n## Risks {#risks}\nvendor lock-in here, vendor lock-in there\n";
        let file = index(text, "plan/a.md");
        let start = text.rfind("vendor").unwrap();
        let end = start + "vendor lock-in".len();

        let anchor = build_anchor(text, &file.headings, start, end).unwrap();
        assert_eq!(anchor.quote, "vendor lock-in");
        assert_eq!(anchor.section_id.as_deref(), Some("risks"));
        assert!(anchor.prefix.as_deref().unwrap().ends_with("here, "));
        assert_eq!(anchor.suffix.as_deref(), Some(" there\n"));

        assert_eq!(
            resolve(text, &file.headings, &anchor),
            AnchorMatch::Ok { start, end }
        );
    }

    #[test]
    fn test_build_anchor_clips_context() {
        let text = format!("{}QUOTE{}", "a".repeat(100), "b".repeat(100));
        let anchor = build_anchor(&text, &[], 100, 105).unwrap();
        assert_eq!(anchor.prefix.unwrap().len(), CONTEXT_CHARS);
        assert_eq!(anchor.suffix.unwrap().len(), CONTEXT_CHARS);
        assert!(anchor.section_id.is_none());
    }

    #[test]
    fn test_build_anchor_rejects_bad_ranges() {
        let text = "héllo";
        assert!(build_anchor(text, &[], 2, 2).is_err());
        assert!(build_anchor(text, &[], 0, 99).is_err());
        assert!(build_anchor(text, &[], 2, 4).is_err());
    }

    #[test]
    fn test_innermost_heading() {
        let text = "# A\n## B\n### C\nbody\n";
        let file = index(text, "plan/a.md");
        let start = text.find("body").unwrap();
        let h = innermost_heading(&file.headings, start, start + 4).unwrap();
        assert_eq!(h.title, "C");
        assert!(innermost_heading(&file.headings, 0, text.len()).is_some());
        assert!(innermost_heading(&[], 0, 1).is_none());
    }
}
