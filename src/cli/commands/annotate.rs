//! Annotation command implementations.

use crate::cli::{AnnotateCommands, AnnotateCreateArgs, AnnotateUpdateArgs, KindArg};
use crate::config::default_actor;
use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::model::{
    AnchorMatch, Annotation, AnnotationKind, AnnotationStatus, AnnotationTarget, Priority,
};
use crate::service;
use crate::validate::{normalize_priority, normalize_status};
use colored::Colorize;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

use super::resolve::anchor_from_args;
use super::{open_context, print_json, truncate};

#[derive(Serialize)]
struct ListOutput {
    annotations: Vec<Annotation>,
    count: usize,
}

#[derive(Serialize)]
struct ReanchorOutput {
    results: Vec<service::Reanchored>,
    count: usize,
    updated: usize,
}

/// Execute annotate commands.
///
/// # Errors
///
/// Returns an error if the operation fails.
pub fn execute(command: &AnnotateCommands, project: Option<&Path>, json: bool) -> Result<()> {
    let ctx = open_context(project)?;
    match command {
        AnnotateCommands::Create(args) => create(&ctx, args, json),
        AnnotateCommands::List {
            path,
            status,
            cycle,
        } => list(&ctx, path.as_deref(), status, cycle.as_deref(), json),
        AnnotateCommands::Show { id } => show(&ctx, id, json),
        AnnotateCommands::Update(args) => update(&ctx, args, json),
        AnnotateCommands::Reanchor { ids, all } => reanchor(&ctx, ids, *all, json),
        AnnotateCommands::Archive { ids } => archive(&ctx, ids, json),
    }
}

fn create(ctx: &AppContext, args: &AnnotateCreateArgs, json: bool) -> Result<()> {
    let target = match (&args.quote, &args.context.section) {
        (Some(quote), _) => AnnotationTarget::selection(anchor_from_args(quote, &args.context)),
        (None, Some(section_id)) => AnnotationTarget::Section {
            section_id: section_id.clone(),
        },
        (None, None) => AnnotationTarget::File,
    };

    let mut draft = Annotation::new(
        args.path.clone(),
        target,
        kind_from_arg(args.kind),
        args.body.clone(),
    )
    .with_tags(args.tags.clone())
    .with_author(&default_actor());

    if let Some(priority) = &args.priority {
        draft = draft.with_priority(parse_priority(priority)?);
    }
    for link in &args.links {
        let (label, url) = link.split_once('=').ok_or_else(|| {
            Error::InvalidArgument(format!("work link '{link}' must be LABEL=URL"))
        })?;
        draft = draft.with_work_link(label.trim(), url.trim());
    }

    let annotation = service::create_annotation(ctx, draft)?;

    if json {
        print_json(&annotation)
    } else {
        println!(
            "Created {} on {} ({})",
            annotation.id().cyan(),
            annotation.path,
            describe_target(&annotation.target)
        );
        Ok(())
    }
}

fn list(
    ctx: &AppContext,
    path: Option<&str>,
    status: &str,
    cycle: Option<&str>,
    json: bool,
) -> Result<()> {
    let status_filter = match status {
        "all" => None,
        "active" => Some(None),
        other => Some(Some(parse_status(other)?)),
    };

    let annotations = ctx.annotations.list_where(|a| {
        path.is_none_or(|p| a.path == p)
            && cycle.is_none_or(|c| a.cycle_id.as_deref() == Some(c))
            && match status_filter {
                None => true,
                Some(None) => a.status.is_active(),
                Some(Some(wanted)) => a.status == wanted,
            }
    })?;

    if json {
        return print_json(&ListOutput {
            count: annotations.len(),
            annotations,
        });
    }

    if annotations.is_empty() {
        println!("No annotations found.");
        return Ok(());
    }

    println!("Annotations ({} found):", annotations.len());
    println!();
    for ann in &annotations {
        println!(
            "{} {} {} {} {}",
            status_icon(ann.status),
            ann.id().cyan(),
            format!("[{}]", ann.kind.as_str()).dimmed(),
            truncate(&ann.body, 60),
            format!("({})", ann.priority.as_str()).dimmed()
        );
        println!(
            "    {} {}",
            ann.path.dimmed(),
            describe_target(&ann.target).dimmed()
        );
    }
    Ok(())
}

fn show(ctx: &AppContext, id: &str, json: bool) -> Result<()> {
    let ann = ctx.annotations.require(id)?;

    if json {
        return print_json(&ann);
    }

    println!("{} {}", ann.id().cyan().bold(), status_icon(ann.status));
    println!("  Path:     {}", ann.path);
    println!("  Target:   {}", describe_target(&ann.target));
    println!("  Kind:     {}", ann.kind.as_str());
    println!("  Status:   {}", ann.status.as_str());
    println!("  Priority: {}", ann.priority.as_str());
    if !ann.tags.is_empty() {
        println!("  Tags:     {}", ann.tags.join(", "));
    }
    if let Some(author) = &ann.author {
        println!("  Author:   {author}");
    }
    if let Some(cycle) = &ann.cycle_id {
        println!("  Cycle:    {cycle}");
    }
    for link in &ann.work_links {
        println!("  Link:     {} {}", link.label, link.url.dimmed());
    }
    println!(
        "  Updated:  {}",
        ann.meta.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!();
    println!("{}", ann.body);
    Ok(())
}

fn update(ctx: &AppContext, args: &AnnotateUpdateArgs, json: bool) -> Result<()> {
    let patch = build_update_patch(args)?;
    if patch.as_object().is_some_and(Map::is_empty) {
        return Err(Error::InvalidArgument(
            "nothing to update (pass --body, --status, --priority, --tag or --patch)".to_string(),
        ));
    }

    let updated = service::update_annotation(ctx, &args.id, &patch)?;

    if json {
        print_json(&updated)
    } else {
        println!("Updated {}", updated.id().cyan());
        Ok(())
    }
}

/// Fold the update flags and the raw `--patch` into one merge patch.
fn build_update_patch(args: &AnnotateUpdateArgs) -> Result<Value> {
    let mut patch = Map::new();
    if let Some(body) = &args.body {
        patch.insert("body".to_string(), Value::String(body.clone()));
    }
    if let Some(status) = &args.status {
        patch.insert("status".to_string(), serde_json::to_value(parse_status(status)?)?);
    }
    if let Some(priority) = &args.priority {
        patch.insert(
            "priority".to_string(),
            serde_json::to_value(parse_priority(priority)?)?,
        );
    }
    if !args.tags.is_empty() {
        patch.insert("tags".to_string(), serde_json::to_value(&args.tags)?);
    }

    if let Some(raw) = &args.patch {
        let extra: Value = serde_json::from_str(raw)
            .map_err(|e| Error::InvalidArgument(format!("--patch is not valid JSON: {e}")))?;
        let Value::Object(extra) = extra else {
            return Err(Error::InvalidArgument(
                "--patch must be a JSON object".to_string(),
            ));
        };
        patch.extend(extra);
    }
    Ok(Value::Object(patch))
}

fn reanchor(ctx: &AppContext, ids: &[String], all: bool, json: bool) -> Result<()> {
    let ids: Vec<String> = if all {
        ctx.annotations
            .list_where(|a| {
                a.status.is_active() && matches!(a.target, AnnotationTarget::Selection { .. })
            })?
            .into_iter()
            .map(|a| a.meta.id)
            .collect()
    } else if ids.is_empty() {
        return Err(Error::InvalidArgument(
            "pass annotation IDs or --all".to_string(),
        ));
    } else {
        ids.to_vec()
    };

    let mut results = Vec::with_capacity(ids.len());
    for id in &ids {
        results.push(service::reanchor(ctx, id)?);
    }

    if json {
        let updated = results.iter().filter(|r| r.updated).count();
        return print_json(&ReanchorOutput {
            count: results.len(),
            updated,
            results,
        });
    }

    if results.is_empty() {
        println!("No selection annotations to re-anchor.");
    }
    for result in &results {
        let id = result.annotation.id();
        match result.anchor_match {
            AnchorMatch::Ok { .. } if result.updated => {
                println!("{} {} anchor refreshed", "✓".green(), id.cyan());
            }
            AnchorMatch::Ok { .. } => println!("{} {} unchanged", "✓".green(), id.cyan()),
            AnchorMatch::Missing => {
                println!("{} {} quote no longer in {}", "✗".red(), id.cyan(), result.annotation.path);
            }
            AnchorMatch::Ambiguous { candidates } => println!(
                "{} {} quote matches {candidates} locations",
                "!".yellow(),
                id.cyan()
            ),
        }
    }
    Ok(())
}

fn archive(ctx: &AppContext, ids: &[String], json: bool) -> Result<()> {
    let mut archived = Vec::with_capacity(ids.len());
    for id in ids {
        archived.push(service::archive_annotation(ctx, id)?);
    }

    if json {
        return print_json(&ListOutput {
            count: archived.len(),
            annotations: archived,
        });
    }
    for ann in &archived {
        println!("Archived {}", ann.id().cyan());
    }
    Ok(())
}

const fn kind_from_arg(kind: KindArg) -> AnnotationKind {
    match kind {
        KindArg::Todo => AnnotationKind::Todo,
        KindArg::Note => AnnotationKind::Note,
        KindArg::Risk => AnnotationKind::Risk,
    }
}

fn parse_status(input: &str) -> Result<AnnotationStatus> {
    normalize_status(input).map_err(|(value, suggestion)| {
        let hint = suggestion.map(|s| format!(" (did you mean '{s}'?)")).unwrap_or_default();
        Error::InvalidArgument(format!("unknown status '{value}'{hint}"))
    })
}

fn parse_priority(input: &str) -> Result<Priority> {
    normalize_priority(input)
        .map_err(|(value, _)| Error::InvalidArgument(format!("unknown priority '{value}'")))
}

fn describe_target(target: &AnnotationTarget) -> String {
    match target {
        AnnotationTarget::File => "whole file".to_string(),
        AnnotationTarget::Section { section_id } => format!("section #{section_id}"),
        AnnotationTarget::Selection {
            quote,
            section_id_hint,
            ..
        } => {
            let quote = truncate(quote, 40);
            match section_id_hint {
                Some(section) => format!("\"{quote}\" in #{section}"),
                None => format!("\"{quote}\""),
            }
        }
    }
}

const fn status_icon(status: AnnotationStatus) -> &'static str {
    match status {
        AnnotationStatus::Open => "○",
        AnnotationStatus::InProgress => "◐",
        AnnotationStatus::Blocked => "⊘",
        AnnotationStatus::Done => "●",
        AnnotationStatus::Archived => "·",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update_args() -> AnnotateUpdateArgs {
        AnnotateUpdateArgs {
            id: "ann_0123456789ab".to_string(),
            body: None,
            status: None,
            priority: None,
            tags: Vec::new(),
            patch: None,
        }
    }

    #[test]
    fn test_update_patch_from_flags() {
        let args = AnnotateUpdateArgs {
            status: Some("wip".to_string()),
            priority: Some("P0".to_string()),
            tags: vec!["infra".to_string()],
            ..update_args()
        };
        let patch = build_update_patch(&args).unwrap();
        assert_eq!(
            patch,
            json!({"status": "in_progress", "priority": "critical", "tags": ["infra"]})
        );
    }

    #[test]
    fn test_raw_patch_overrides_flags() {
        let args = AnnotateUpdateArgs {
            body: Some("flag".to_string()),
            patch: Some(r#"{"body": "raw", "author": null}"#.to_string()),
            ..update_args()
        };
        let patch = build_update_patch(&args).unwrap();
        assert_eq!(patch["body"], "raw");
        assert!(patch["author"].is_null());
    }

    #[test]
    fn test_raw_patch_must_be_object() {
        let args = AnnotateUpdateArgs {
            patch: Some("[1, 2]".to_string()),
            ..update_args()
        };
        assert!(build_update_patch(&args).is_err());
    }

    #[test]
    fn test_parse_status_suggests() {
        let err = parse_status("archivd").unwrap_err();
        assert!(err.to_string().contains("did you mean 'archived'"));
        assert_eq!(parse_status("closed").unwrap(), AnnotationStatus::Done);
    }
}
