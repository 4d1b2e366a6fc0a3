//! Line-oriented markdown heading scanner.
//!
//! Scope:
//! - ATX headings (`#` … `######`, up to three spaces of indentation,
//!   optional closing `#` run).
//! - Setext headings (`===` → level 1, `---` → level 2) under a paragraph.
//! - Fenced code blocks (```` ``` ```` / `~~~`) and indented code are opaque.
//! - A leading YAML front-matter block (`---` … `---`/`...`) is opaque.
//!
//! Container blocks (lists, block quotes) are not descended into; a `#`
//! inside them is not a document heading.

/// A heading as it appears in the source, before id extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeading {
    pub level: u8,
    /// Heading text with markers stripped (may still carry a `{#id}`)
    pub text: String,
    /// 1-based line of the heading's first line
    pub line: usize,
    /// Byte offset of the heading's first line
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    marker: u8,
    len: usize,
}

/// Paragraph currently being accumulated; a setext underline turns it into
/// a heading.
#[derive(Debug)]
struct Paragraph {
    line: usize,
    offset: usize,
    lines: Vec<String>,
}

/// Scan `text` for headings in document order.
#[must_use]
pub fn scan_headings(text: &str) -> Vec<RawHeading> {
    let lines = split_lines(text);
    let mut headings = Vec::new();
    let mut fence: Option<Fence> = None;
    let mut paragraph: Option<Paragraph> = None;

    let skip = front_matter_len(&lines);

    for (idx, &(offset, line)) in lines.iter().enumerate().skip(skip) {
        let line_no = idx + 1;

        if let Some(open) = fence {
            if closes_fence(line, open) {
                fence = None;
            }
            continue;
        }

        if line.trim().is_empty() {
            paragraph = None;
            continue;
        }

        let indent = indentation(line);
        if indent >= 4 {
            // Indented code unless it continues a paragraph
            if let Some(p) = paragraph.as_mut() {
                p.lines.push(line.trim().to_string());
            }
            continue;
        }

        let body = &line[indent..];

        if let Some(open) = opens_fence(body) {
            fence = Some(open);
            paragraph = None;
            continue;
        }

        if let Some((level, text)) = atx_heading(body) {
            headings.push(RawHeading {
                level,
                text,
                line: line_no,
                offset,
            });
            paragraph = None;
            continue;
        }

        if let Some(level) = setext_underline(body)
            && let Some(p) = paragraph.take()
        {
            headings.push(RawHeading {
                level,
                text: p.lines.join(" "),
                line: p.line,
                offset: p.offset,
            });
            continue;
        }

        match paragraph.as_mut() {
            Some(_) if interrupts_paragraph(body) => paragraph = None,
            Some(p) => p.lines.push(body.trim().to_string()),
            None if starts_container(body) => {}
            None => {
                paragraph = Some(Paragraph {
                    line: line_no,
                    offset,
                    lines: vec![body.trim().to_string()],
                });
            }
        }
    }

    headings
}

/// Split into `(byte_offset, line)` pairs with `\n` / `\r\n` removed.
fn split_lines(text: &str) -> Vec<(usize, &str)> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for raw in text.split_inclusive('\n') {
        let line = raw
            .strip_suffix('\n')
            .map_or(raw, |l| l.strip_suffix('\r').unwrap_or(l));
        lines.push((offset, line));
        offset += raw.len();
    }
    lines
}

/// Number of lines taken by a leading front-matter block, 0 if none.
fn front_matter_len(lines: &[(usize, &str)]) -> usize {
    if lines.first().is_none_or(|(_, l)| l.trim_end() != "---") {
        return 0;
    }
    lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, (_, l))| matches!(l.trim_end(), "---" | "..."))
        .map_or(0, |(idx, _)| idx + 1)
}

fn indentation(line: &str) -> usize {
    line.bytes().take_while(|&b| b == b' ').count()
}

fn opens_fence(body: &str) -> Option<Fence> {
    let marker = *body.as_bytes().first()?;
    if marker != b'`' && marker != b'~' {
        return None;
    }
    let len = body.bytes().take_while(|&b| b == marker).count();
    if len < 3 {
        return None;
    }
    // Backtick fences cannot carry backticks in their info string
    if marker == b'`' && body[len..].contains('`') {
        return None;
    }
    Some(Fence { marker, len })
}

fn closes_fence(line: &str, open: Fence) -> bool {
    let indent = indentation(line);
    if indent >= 4 {
        return false;
    }
    let body = &line[indent..];
    let len = body.bytes().take_while(|&b| b == open.marker).count();
    len >= open.len && body[len..].trim().is_empty()
}

fn atx_heading(body: &str) -> Option<(u8, String)> {
    let level = body.bytes().take_while(|&b| b == b'#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &body[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }

    let mut content = rest.trim();
    // Optional closing sequence: a run of `#` preceded by whitespace
    let without_hashes = content.trim_end_matches('#');
    if without_hashes.is_empty() {
        content = "";
    } else if without_hashes.len() < content.len() && without_hashes.ends_with([' ', '\t']) {
        content = without_hashes.trim_end();
    }

    let level = u8::try_from(level).ok()?;
    Some((level, content.to_string()))
}

fn setext_underline(body: &str) -> Option<u8> {
    let trimmed = body.trim_end();
    let marker = trimmed.chars().next()?;
    if !trimmed.chars().all(|c| c == marker) {
        return None;
    }
    match marker {
        '=' => Some(1),
        '-' => Some(2),
        _ => None,
    }
}

/// Lines that open a container block rather than a paragraph.
fn starts_container(body: &str) -> bool {
    body.starts_with('>')
        || body.starts_with("- ")
        || body.starts_with("* ")
        || body.starts_with("+ ")
        || body
            .split_once(['.', ')'])
            .is_some_and(|(n, rest)| {
                !n.is_empty()
                    && n.len() <= 9
                    && n.bytes().all(|b| b.is_ascii_digit())
                    && (rest.is_empty() || rest.starts_with(' '))
            })
}

/// Whether a container start ends an open paragraph instead of continuing it.
///
/// Block quotes and bullets always do. An ordered item only does when it
/// starts at 1 and is not empty.
fn interrupts_paragraph(body: &str) -> bool {
    if !starts_container(body) {
        return false;
    }
    match body.split_once(['.', ')']) {
        Some((n, rest)) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => {
            n == "1" && !rest.trim().is_empty()
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels_and_text(text: &str) -> Vec<(u8, String)> {
        scan_headings(text)
            .into_iter()
            .map(|h| (h.level, h.text))
            .collect()
    }

    #[test]
    fn test_atx_levels() {
        let found = levels_and_text("# One\n## Two\n###### Six\n####### Seven\n");
        assert_eq!(
            found,
            vec![
                (1, "One".to_string()),
                (2, "Two".to_string()),
                (6, "Six".to_string()),
            ]
        );
    }

    #[test]
    fn test_atx_requires_space() {
        assert!(scan_headings("#hashtag\n").is_empty());
        assert_eq!(levels_and_text("#\n"), vec![(1, String::new())]);
    }

    #[test]
    fn test_atx_closing_sequence() {
        assert_eq!(
            levels_and_text("## Title ##\n## C# ##\n## Issue#1\n"),
            vec![
                (2, "Title".to_string()),
                (2, "C#".to_string()),
                (2, "Issue#1".to_string()),
            ]
        );
    }

    #[test]
    fn test_offsets_and_lines() {
        let headings = scan_headings("intro\n\n# A\r\ntext\n   ## B\n");
        assert_eq!(headings[0].line, 3);
        assert_eq!(headings[0].offset, 7);
        assert_eq!(headings[1].line, 5);
        assert_eq!(headings[1].offset, 17);
    }

    #[test]
    fn test_fenced_code_is_opaque() {
        let text = "# Real\n```md\n# Not a heading\n```\n~~~~\n## Nope\n~~~\n~~~~\n## After\n";
        assert_eq!(
            levels_and_text(text),
            vec![(1, "Real".to_string()), (2, "After".to_string())]
        );
    }

    #[test]
    fn test_indented_code_is_opaque() {
        assert!(scan_headings("    # code\n").is_empty());
    }

    #[test]
    fn test_setext_headings() {
        let headings = scan_headings("Title\n=====\n\nSub part\nsecond line\n---\n");
        assert_eq!(headings.len(), 2);
        assert_eq!(headings[0].level, 1);
        assert_eq!(headings[0].text, "Title");
        assert_eq!(headings[0].line, 1);
        assert_eq!(headings[1].level, 2);
        assert_eq!(headings[1].text, "Sub part second line");
        assert_eq!(headings[1].line, 4);
    }

    #[test]
    fn test_dashes_without_paragraph_are_not_headings() {
        assert!(scan_headings("# A\n---\n").len() == 1);
        assert!(scan_headings("- item\n---\n").is_empty());
    }

    #[test]
    fn test_list_item_interrupts_paragraph() {
        assert!(scan_headings("para\n- item\n---\n").is_empty());
        assert!(scan_headings("para\n> quote\n---\n").is_empty());
        assert!(scan_headings("para\n1. first\n---\n").is_empty());

        // Only an ordered list starting at 1 breaks a paragraph
        let headings = scan_headings("Step\n2. more\n---\n");
        assert_eq!(headings.len(), 1);
        assert_eq!(headings[0].text, "Step 2. more");
    }

    #[test]
    fn test_front_matter_is_skipped() {
        let text = "---\ntitle: x\n# not heading\n---\n# Body\n";
        let headings = scan_headings(text);
        assert_eq!(headings.len(), 1);
        assert_eq!(headings[0].text, "Body");
        assert_eq!(headings[0].line, 5);
    }

    #[test]
    fn test_unclosed_front_matter_is_content() {
        let headings = scan_headings("---\n# Heading\n");
        assert_eq!(headings.len(), 1);
    }

    #[test]
    fn test_block_quote_is_not_heading() {
        assert!(scan_headings("> # quoted\n").is_empty());
    }
}
