//! Cycle command implementations.

use crate::cli::{CycleCommands, FormatArg};
use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::model::{Annotation, BundleFormat, CommitInfo, Cycle, CycleStatus};
use crate::service;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{open_context, print_json, truncate};

#[derive(Serialize)]
struct ListOutput {
    cycles: Vec<Cycle>,
    count: usize,
}

#[derive(Serialize)]
struct ShowOutput {
    cycle: Cycle,
    annotations: Vec<Annotation>,
}

/// Execute cycle commands.
///
/// # Errors
///
/// Returns an error if the operation fails.
pub fn execute(command: &CycleCommands, project: Option<&Path>, json: bool) -> Result<()> {
    let ctx = open_context(project)?;
    match command {
        CycleCommands::Create { title } => create(&ctx, title, json),
        CycleCommands::List { all } => list(&ctx, *all, json),
        CycleCommands::Show { id } => show(&ctx, id, json),
        CycleCommands::Add { id, annotations } => add(&ctx, id, annotations, json),
        CycleCommands::Close { id } => close(&ctx, id, json),
        CycleCommands::Bundle { id, file, format } => {
            bundle(&ctx, id, file.as_ref(), *format, json)
        }
        CycleCommands::Revision { id, commit } => revision(&ctx, id, commit, json),
    }
}

fn create(ctx: &AppContext, title: &str, json: bool) -> Result<()> {
    let cycle = service::create_cycle(ctx, title)?;
    if json {
        print_json(&cycle)
    } else {
        println!("Created cycle {}: {}", cycle.meta.id.cyan(), cycle.title);
        Ok(())
    }
}

fn list(ctx: &AppContext, all: bool, json: bool) -> Result<()> {
    let cycles = ctx.cycles.list_where(|c| all || !c.is_closed())?;

    if json {
        return print_json(&ListOutput {
            count: cycles.len(),
            cycles,
        });
    }

    if cycles.is_empty() {
        println!("No cycles found.");
        return Ok(());
    }
    for cycle in &cycles {
        let status = match cycle.status {
            CycleStatus::Open => "open".green(),
            CycleStatus::Closed => "closed".dimmed(),
        };
        println!(
            "{} {} [{status}] {}",
            cycle.meta.id.cyan(),
            truncate(&cycle.title, 50),
            format!("({} annotations)", cycle.annotation_ids.len()).dimmed()
        );
    }
    Ok(())
}

fn show(ctx: &AppContext, id: &str, json: bool) -> Result<()> {
    let cycle = ctx.cycles.require(id)?;
    let annotations = cycle
        .annotation_ids
        .iter()
        .filter_map(|ann_id| ctx.annotations.get(ann_id).ok().flatten())
        .collect::<Vec<_>>();

    if json {
        return print_json(&ShowOutput { cycle, annotations });
    }

    println!("{} {}", cycle.meta.id.cyan().bold(), cycle.title.bold());
    println!("  Status:  {}", cycle.status.as_str());
    println!(
        "  Created: {}",
        cycle.meta.created_at.format("%Y-%m-%d %H:%M")
    );
    if let Some(closed_at) = cycle.closed_at {
        println!("  Closed:  {}", closed_at.format("%Y-%m-%d %H:%M"));
    }
    println!();
    if annotations.is_empty() {
        println!("No annotations in this cycle.");
    }
    for ann in &annotations {
        println!(
            "  {} {} {}",
            ann.id().cyan(),
            format!("[{}]", ann.status.as_str()).dimmed(),
            truncate(&ann.body, 60)
        );
    }
    Ok(())
}

fn add(ctx: &AppContext, id: &str, annotation_ids: &[String], json: bool) -> Result<()> {
    let cycle = service::add_to_cycle(ctx, id, annotation_ids)?;
    if json {
        print_json(&cycle)
    } else {
        println!(
            "Cycle {} now has {} annotations",
            cycle.meta.id.cyan(),
            cycle.annotation_ids.len()
        );
        Ok(())
    }
}

fn close(ctx: &AppContext, id: &str, json: bool) -> Result<()> {
    let cycle = service::close_cycle(ctx, id)?;
    if json {
        print_json(&cycle)
    } else {
        println!("Closed cycle {}", cycle.meta.id.cyan());
        Ok(())
    }
}

fn bundle(
    ctx: &AppContext,
    id: &str,
    file: Option<&PathBuf>,
    format: FormatArg,
    json: bool,
) -> Result<()> {
    let payload = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    if payload.trim().is_empty() {
        return Err(Error::InvalidArgument("bundle payload is empty".to_string()));
    }

    let format = match format {
        FormatArg::Markdown => BundleFormat::Markdown,
        FormatArg::Text => BundleFormat::Text,
        FormatArg::Json => BundleFormat::Json,
    };
    let bundle = service::record_bundle(ctx, id, format, payload)?;

    if json {
        print_json(&bundle)
    } else {
        println!(
            "Stored bundle {} for cycle {} ({} annotations)",
            bundle.meta.id.cyan(),
            bundle.cycle_id,
            bundle.annotation_count
        );
        Ok(())
    }
}

fn revision(ctx: &AppContext, id: &str, commit: &str, json: bool) -> Result<()> {
    let (info, patch, paths) = read_commit(ctx.project_root(), commit)?;
    let revision = service::record_revision(ctx, id, info, patch, paths)?;

    if json {
        print_json(&revision)
    } else {
        println!(
            "Recorded {} ({}) for cycle {}",
            revision.meta.id.cyan(),
            &revision.commit.sha[..revision.commit.sha.len().min(8)],
            revision.cycle_id
        );
        Ok(())
    }
}

/// Read commit metadata, patch and touched paths from git.
fn read_commit(repo: &Path, rev: &str) -> Result<(CommitInfo, String, Vec<String>)> {
    let header = git(repo, &["show", "-s", "--format=%H%x00%an%x00%cI%x00%s", rev])?;
    let info = parse_commit_header(&header)
        .ok_or_else(|| Error::InvalidArgument(format!("cannot read commit '{rev}'")))?;
    let patch = git(repo, &["show", "--format=", "--patch", rev])?;
    let paths = git(repo, &["show", "--format=", "--name-only", rev])?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    Ok((info, patch, paths))
}

fn parse_commit_header(header: &str) -> Option<CommitInfo> {
    let mut fields = header.trim_end_matches('\n').splitn(4, '\0');
    let sha = fields.next()?.trim().to_string();
    let author = fields.next()?.to_string();
    let committed_at = fields
        .next()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));
    let message = fields.next()?.to_string();
    if sha.is_empty() {
        return None;
    }
    Some(CommitInfo {
        sha,
        author,
        message,
        committed_at,
    })
}

fn git(repo: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git").arg("-C").arg(repo).args(args).output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::InvalidArgument(format!(
            "git {} failed: {}",
            args.first().copied().unwrap_or_default(),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commit_header() {
        let header = "abc123\0Ada\02026-01-02T03:04:05+00:00\0Implement plan\n";
        let info = parse_commit_header(header).unwrap();
        assert_eq!(info.sha, "abc123");
        assert_eq!(info.author, "Ada");
        assert_eq!(info.message, "Implement plan");
        assert_eq!(
            info.committed_at.unwrap().to_rfc3339(),
            "2026-01-02T03:04:05+00:00"
        );
    }

    #[test]
    fn test_parse_commit_header_rejects_garbage() {
        assert!(parse_commit_header("").is_none());
        assert!(parse_commit_header("only-sha").is_none());
    }
}
