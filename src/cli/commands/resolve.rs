//! Resolve command: locate a quote in a document without storing anything.

use crate::anchor;
use crate::cli::{QuoteArgs, ResolveArgs};
use crate::error::Result;
use crate::index::LineTable;
use crate::model::{AnchorMatch, AnchorV1};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

use super::{open_context, print_json};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveOutput {
    path: String,
    #[serde(rename = "match")]
    anchor_match: AnchorMatch,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    /// Anchor that would be stored for this selection
    #[serde(skip_serializing_if = "Option::is_none")]
    anchor_v1: Option<AnchorV1>,
}

/// Build an anchor from a quote and the optional narrowing flags.
#[must_use]
pub fn anchor_from_args(quote: &str, context: &QuoteArgs) -> AnchorV1 {
    let mut anchor = AnchorV1::quote(quote);
    if let Some(section) = &context.section {
        anchor = anchor.with_section(section.as_str());
    }
    if let Some(prefix) = &context.prefix {
        anchor = anchor.with_prefix(prefix.as_str());
    }
    if let Some(suffix) = &context.suffix {
        anchor = anchor.with_suffix(suffix.as_str());
    }
    anchor
}

/// Execute the resolve command.
///
/// `missing` and `ambiguous` are reported as results, not errors.
///
/// # Errors
///
/// Returns path guard errors or `NOT_FOUND` for a missing document.
pub fn execute(project: Option<&Path>, args: &ResolveArgs, json: bool) -> Result<()> {
    let ctx = open_context(project)?;
    let (text, file) = ctx.document(&args.path)?;

    let anchor_v1 = anchor_from_args(&args.quote, &args.context);
    let anchor_match = anchor::resolve(&text, &file.headings, &anchor_v1);

    let (line, refined) = match anchor_match.range() {
        Some((start, end)) => (
            Some(LineTable::new(&text).line_of(start)),
            Some(anchor::build_anchor(&text, &file.headings, start, end)?),
        ),
        None => (None, None),
    };

    if json {
        return print_json(&ResolveOutput {
            path: args.path.clone(),
            anchor_match,
            line,
            anchor_v1: refined,
        });
    }

    match anchor_match {
        AnchorMatch::Ok { start, end } => {
            let section = refined
                .as_ref()
                .and_then(|a| a.section_id.as_deref())
                .map(|s| format!(" in #{s}"))
                .unwrap_or_default();
            println!(
                "{} {}:{}{} {}",
                "✓".green(),
                args.path,
                line.unwrap_or_default(),
                section.cyan(),
                format!("(bytes {start}..{end})").dimmed()
            );
        }
        AnchorMatch::Missing => println!("{} quote not found in {}", "✗".red(), args.path),
        AnchorMatch::Ambiguous { candidates } => {
            println!(
                "{} quote matches {candidates} locations in {}",
                "!".yellow(),
                args.path
            );
            println!("  Narrow it with --section, --prefix or --suffix");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_from_args() {
        let context = QuoteArgs {
            section: Some("risks".to_string()),
            prefix: None,
            suffix: Some(" now".to_string()),
        };
        let anchor = anchor_from_args("ship it", &context);
        assert_eq!(anchor.quote, "ship it");
        assert_eq!(anchor.section_id.as_deref(), Some("risks"));
        assert_eq!(anchor.prefix, None);
        assert_eq!(anchor.suffix.as_deref(), Some(" now"));
    }
}
