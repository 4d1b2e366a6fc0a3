//! Index and outline commands.

use crate::error::Result;
use crate::watch::{IndexSummary, ReindexOutcome, Reindexer};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use super::{open_context, print_json};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexOneOutput {
    path: String,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    heading_count: Option<usize>,
}

#[derive(Serialize)]
struct IndexAllOutput {
    #[serde(flatten)]
    summary: IndexSummary,
    documents: usize,
}

/// Execute the index command.
///
/// # Errors
///
/// Returns path guard errors for an explicit path, or `PLAN_ROOT_MISSING`
/// when indexing everything.
pub fn execute(project: Option<&Path>, path: Option<&str>, json: bool) -> Result<()> {
    let reindexer = Reindexer::new(Arc::new(open_context(project)?));

    match path {
        Some(path) => index_one(&reindexer, path, json),
        None => index_all(&reindexer, json),
    }
}

fn index_one(reindexer: &Reindexer, path: &str, json: bool) -> Result<()> {
    let ctx = reindexer.context();
    ctx.guard().resolve(path)?;

    let outcome = reindexer.trigger(path);
    let (label, error) = match &outcome {
        ReindexOutcome::Indexed => ("indexed", None),
        ReindexOutcome::Unchanged | ReindexOutcome::Coalesced => ("unchanged", None),
        ReindexOutcome::Removed => ("removed", None),
        ReindexOutcome::Failed(message) => ("failed", Some(message.clone())),
    };
    let heading_count = ctx.catalog().get(path).map(|f| f.headings.len());

    if json {
        return print_json(&IndexOneOutput {
            path: path.to_string(),
            outcome: label,
            error,
            heading_count,
        });
    }

    match (&outcome, heading_count) {
        (ReindexOutcome::Failed(message), _) => {
            println!("{} {path}: {message}", "✗".red());
        }
        (ReindexOutcome::Removed, _) => println!("{} {path} (missing)", "-".yellow()),
        (_, Some(count)) => println!("{} {path} ({count} headings)", "✓".green()),
        (_, None) => println!("{} {path}", "✓".green()),
    }
    Ok(())
}

fn index_all(reindexer: &Reindexer, json: bool) -> Result<()> {
    let summary = reindexer.index_all()?;
    let documents = reindexer.context().catalog().len();

    if json {
        return print_json(&IndexAllOutput { summary, documents });
    }

    println!("Indexed {documents} documents");
    println!(
        "  {} indexed, {} unchanged, {} removed, {}",
        summary.indexed,
        summary.unchanged,
        summary.removed,
        if summary.failed > 0 {
            format!("{} failed", summary.failed).red().to_string()
        } else {
            "0 failed".to_string()
        }
    );
    Ok(())
}

/// Execute the outline command.
///
/// # Errors
///
/// Returns path guard errors or `NOT_FOUND` for a missing document.
pub fn outline(project: Option<&Path>, path: &str, json: bool) -> Result<()> {
    let ctx = open_context(project)?;
    let (_, file) = ctx.document(path)?;

    if json {
        return print_json(file.as_ref());
    }

    if file.headings.is_empty() {
        println!("No headings in {path}.");
        return Ok(());
    }

    println!("{} ({} headings)", file.path.bold(), file.headings.len());
    for heading in &file.headings {
        let indent = "  ".repeat(usize::from(heading.level.saturating_sub(1)));
        println!(
            "{indent}{} {} {}",
            heading.title,
            format!("#{}", heading.section_id).cyan(),
            format!("L{}-{}", heading.line_start, heading.line_end).dimmed()
        );
    }
    Ok(())
}
