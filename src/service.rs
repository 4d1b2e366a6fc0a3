//! Request-level operations.
//!
//! Each operation loads what it needs through the [`AppContext`], writes
//! through the record stores, and emits the matching `*:changed` event
//! after a successful write.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::anchor;
use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::model::{
    AnchorMatch, Annotation, AnnotationStatus, AnnotationTarget, Bundle, BundleFormat, CommitInfo,
    Cycle, CycleStatus, NodeMeta, Revision,
};

/// Create an annotation from a draft.
///
/// The target is checked against the current document: a section must
/// exist, and a selection quote must resolve to exactly one location. A
/// resolved selection is stored with a refreshed anchor (context and
/// innermost section captured from the document).
///
/// # Errors
///
/// - `ANCHOR_AMBIGUOUS` if the quote matches several locations
/// - `INVALID_ARGUMENT` if the quote or section is not in the document
/// - `NOT_FOUND` / `PATH_OUTSIDE_ROOT` for the document path
/// - store errors (`READ_ONLY`, validation)
pub fn create_annotation(ctx: &AppContext, mut draft: Annotation) -> Result<Annotation> {
    let (text, file) = ctx.document(&draft.path)?;

    match &draft.target {
        AnnotationTarget::File => {}
        AnnotationTarget::Section { section_id } => {
            if file.heading(section_id).is_none() {
                return Err(Error::InvalidArgument(format!(
                    "no section '{section_id}' in {}",
                    draft.path
                )));
            }
        }
        AnnotationTarget::Selection { anchor_v1, .. } => {
            match anchor::resolve(&text, &file.headings, anchor_v1) {
                AnchorMatch::Ok { start, end } => {
                    let refined = anchor::build_anchor(&text, &file.headings, start, end)?;
                    draft.target = AnnotationTarget::selection(refined);
                }
                AnchorMatch::Ambiguous { candidates } => {
                    return Err(Error::AnchorAmbiguous { candidates });
                }
                AnchorMatch::Missing => {
                    return Err(Error::InvalidArgument(format!(
                        "quote not found in {}",
                        draft.path
                    )));
                }
            }
        }
    }

    let created = ctx.annotations.create(draft)?;
    info!(id = %created.meta.id, path = %created.path, target = created.target.kind_str(), "Annotation created");
    ctx.emit_record(&created);
    Ok(created)
}

/// Outcome of re-anchoring one annotation.
#[derive(Debug, Clone, Serialize)]
pub struct Reanchored {
    pub annotation: Annotation,
    #[serde(rename = "match")]
    pub anchor_match: AnchorMatch,
    /// Whether a refreshed anchor was persisted
    pub updated: bool,
}

/// Relocate a selection annotation's anchor in the current document.
///
/// On `ok` the refreshed anchor (new context and section hint) is persisted
/// if it differs from the stored one. `missing` and `ambiguous` are
/// returned as data and leave the record untouched.
///
/// # Errors
///
/// `NOT_FOUND` for the annotation or document, `INVALID_ARGUMENT` if the
/// annotation does not target a selection, or store errors.
pub fn reanchor(ctx: &AppContext, id: &str) -> Result<Reanchored> {
    let annotation = ctx.annotations.require(id)?;
    let AnnotationTarget::Selection { anchor_v1, .. } = &annotation.target else {
        return Err(Error::InvalidArgument(format!(
            "annotation {id} targets a {}, not a selection",
            annotation.target.kind_str()
        )));
    };

    let (text, file) = ctx.document(&annotation.path)?;
    let anchor_match = anchor::resolve(&text, &file.headings, anchor_v1);
    let Some((start, end)) = anchor_match.range() else {
        debug!(id, ?anchor_match, "Anchor did not resolve");
        return Ok(Reanchored {
            annotation,
            anchor_match,
            updated: false,
        });
    };

    let refined = anchor::build_anchor(&text, &file.headings, start, end)?;
    if &refined == anchor_v1 {
        return Ok(Reanchored {
            annotation,
            anchor_match,
            updated: false,
        });
    }

    let updated = ctx.annotations.update_with(id, |ann| {
        ann.target = AnnotationTarget::selection(refined);
        Ok(())
    })?;
    info!(id, "Anchor refreshed");
    ctx.emit_record(&updated);
    Ok(Reanchored {
        annotation: updated,
        anchor_match,
        updated: true,
    })
}

/// Merge a JSON patch into an annotation.
///
/// # Errors
///
/// Store errors (`NOT_FOUND`, `INVALID_ARGUMENT`, `READ_ONLY`).
pub fn update_annotation(ctx: &AppContext, id: &str, patch: &Value) -> Result<Annotation> {
    let updated = ctx.annotations.update(id, patch)?;
    ctx.emit_record(&updated);
    Ok(updated)
}

/// Move an annotation to `status`.
///
/// # Errors
///
/// Store errors (`NOT_FOUND`, `READ_ONLY`).
pub fn set_status(ctx: &AppContext, id: &str, status: AnnotationStatus) -> Result<Annotation> {
    let updated = ctx.annotations.update_with(id, |ann| {
        ann.status = status;
        Ok(())
    })?;
    ctx.emit_record(&updated);
    Ok(updated)
}

/// Archive an annotation. Annotations are never deleted in place.
///
/// # Errors
///
/// Store errors (`NOT_FOUND`, `READ_ONLY`).
pub fn archive_annotation(ctx: &AppContext, id: &str) -> Result<Annotation> {
    set_status(ctx, id, AnnotationStatus::Archived)
}

/// Open a new cycle.
///
/// # Errors
///
/// Store errors (`INVALID_ARGUMENT` for an empty title, `READ_ONLY`).
pub fn create_cycle(ctx: &AppContext, title: &str) -> Result<Cycle> {
    let cycle = ctx.cycles.create(Cycle::new(title.trim().to_string()))?;
    info!(id = %cycle.meta.id, "Cycle created");
    ctx.emit_record(&cycle);
    Ok(cycle)
}

/// Pull annotations into an open cycle.
///
/// Ids already in the cycle are ignored. Each added annotation records the
/// cycle id before the cycle itself is written.
///
/// # Errors
///
/// `LOCKED` if the cycle is closed, `NOT_FOUND` for the cycle or any
/// annotation (nothing is written in that case), or store errors.
pub fn add_to_cycle(ctx: &AppContext, cycle_id: &str, annotation_ids: &[String]) -> Result<Cycle> {
    let cycle = ctx.cycles.require(cycle_id)?;
    if cycle.is_closed() {
        return Err(Error::Locked(format!("cycle {cycle_id} is closed")));
    }

    let mut added = Vec::new();
    for id in annotation_ids {
        ctx.annotations.require(id)?;
        if !cycle.annotation_ids.contains(id) && !added.contains(id) {
            added.push(id.clone());
        }
    }
    if added.is_empty() {
        return Ok(cycle);
    }

    // A cycle never lists an annotation that lacks its cycleId
    for id in &added {
        let ann = ctx.annotations.update_with(id, |ann| {
            ann.cycle_id = Some(cycle_id.to_string());
            Ok(())
        })?;
        ctx.emit_record(&ann);
    }

    let updated = ctx.cycles.update_with(cycle_id, |c| {
        c.annotation_ids.extend(added.iter().cloned());
        Ok(())
    })?;
    ctx.emit_record(&updated);
    info!(cycle = cycle_id, added = added.len(), "Annotations added to cycle");
    Ok(updated)
}

/// Close a cycle. Closed cycles are locked.
///
/// # Errors
///
/// `LOCKED` if already closed, `NOT_FOUND`, or store errors.
pub fn close_cycle(ctx: &AppContext, cycle_id: &str) -> Result<Cycle> {
    let updated = ctx.cycles.update_with(cycle_id, |c| {
        if c.is_closed() {
            return Err(Error::Locked(format!("cycle {cycle_id} is already closed")));
        }
        c.status = CycleStatus::Closed;
        c.closed_at = Some(Utc::now());
        Ok(())
    })?;
    info!(cycle = cycle_id, "Cycle closed");
    ctx.emit_record(&updated);
    Ok(updated)
}

/// Store a rendered bundle for a cycle.
///
/// # Errors
///
/// `NOT_FOUND` for the cycle, or store errors.
pub fn record_bundle(
    ctx: &AppContext,
    cycle_id: &str,
    format: BundleFormat,
    payload: String,
) -> Result<Bundle> {
    let cycle = ctx.cycles.require(cycle_id)?;
    let mut bundle = Bundle::new(cycle.meta.id.clone(), format, payload);
    bundle.annotation_count = cycle.annotation_ids.len();

    let created = ctx.bundles.create(bundle)?;
    ctx.emit_record(&created);
    Ok(created)
}

/// Store the commit that implemented (part of) a cycle.
///
/// # Errors
///
/// `NOT_FOUND` for the cycle, or store errors.
pub fn record_revision(
    ctx: &AppContext,
    cycle_id: &str,
    commit: CommitInfo,
    patch: String,
    paths: Vec<String>,
) -> Result<Revision> {
    let cycle = ctx.cycles.require(cycle_id)?;
    let mut revision = Revision::new(cycle.meta.id, commit, patch);
    revision.paths = paths;

    let created = ctx.revisions.create(revision)?;
    ctx.emit_record(&created);
    Ok(created)
}

/// Merge UI/state fields into a node's metadata.
///
/// # Errors
///
/// Store errors.
pub fn set_node_meta(
    ctx: &AppContext,
    node_id: &str,
    fields: serde_json::Map<String, Value>,
) -> Result<NodeMeta> {
    ctx.node_meta.upsert(node_id, fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::events::{ChangeEvent, EventType};
    use crate::model::{AnchorV1, AnnotationKind};
    use serde_json::json;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const DOC: &str = "# Plan {#plan}\n\n## Risks {#risks}\n\nship it now\n\n## Launch {#launch}\n\nship it now\n";

    fn setup() -> (TempDir, AppContext, Arc<Mutex<Vec<ChangeEvent>>>) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("plan")).unwrap();
        fs::write(dir.path().join("plan/roadmap.md"), DOC).unwrap();
        let ctx = AppContext::with_config(dir.path(), ProjectConfig::default()).unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        ctx.bus()
            .subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        (dir, ctx, events)
    }

    fn selection(anchor: AnchorV1) -> Annotation {
        Annotation::new(
            "plan/roadmap.md".to_string(),
            AnnotationTarget::selection(anchor),
            AnnotationKind::Risk,
            "Too early".to_string(),
        )
    }

    fn types(events: &Arc<Mutex<Vec<ChangeEvent>>>) -> Vec<EventType> {
        events.lock().unwrap().iter().map(|e| e.event_type).collect()
    }

    #[test]
    fn test_create_selection_refines_anchor() {
        let (_dir, ctx, events) = setup();
        let ann = create_annotation(&ctx, selection(AnchorV1::quote("ship it").with_section("launch")))
            .unwrap();

        let AnnotationTarget::Selection {
            anchor_v1,
            section_id_hint,
            ..
        } = &ann.target
        else {
            panic!("expected selection target");
        };
        assert_eq!(anchor_v1.section_id.as_deref(), Some("launch"));
        assert_eq!(section_id_hint.as_deref(), Some("launch"));
        assert!(anchor_v1.prefix.is_some());
        assert_eq!(
            types(&events),
            vec![EventType::IndexUpdated, EventType::AnnotationChanged]
        );
    }

    #[test]
    fn test_create_ambiguous_selection_fails() {
        let (_dir, ctx, _events) = setup();
        let err = create_annotation(&ctx, selection(AnchorV1::quote("ship it"))).unwrap_err();
        assert_eq!(err.error_code().as_str(), "ANCHOR_AMBIGUOUS");
        assert!(ctx.annotations.list().unwrap().is_empty());
    }

    #[test]
    fn test_create_missing_quote_and_section() {
        let (_dir, ctx, _events) = setup();
        let err = create_annotation(&ctx, selection(AnchorV1::quote("absent"))).unwrap_err();
        assert_eq!(err.error_code().as_str(), "INVALID_ARGUMENT");

        let section = Annotation::new(
            "plan/roadmap.md".to_string(),
            AnnotationTarget::Section {
                section_id: "nope".to_string(),
            },
            AnnotationKind::Note,
            "x".to_string(),
        );
        let err = create_annotation(&ctx, section).unwrap_err();
        assert_eq!(err.error_code().as_str(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_create_rejects_path_outside_root() {
        let (_dir, ctx, _events) = setup();
        let draft = Annotation::new(
            "../secret.md".to_string(),
            AnnotationTarget::File,
            AnnotationKind::Note,
            "x".to_string(),
        );
        let err = create_annotation(&ctx, draft).unwrap_err();
        assert_eq!(err.error_code().as_str(), "PATH_OUTSIDE_ROOT");
    }

    #[test]
    fn test_reanchor_follows_edits() {
        let (dir, ctx, events) = setup();
        let ann = create_annotation(&ctx, selection(AnchorV1::quote("ship it").with_section("launch")))
            .unwrap();

        let unchanged = reanchor(&ctx, &ann.meta.id).unwrap();
        assert!(unchanged.anchor_match.is_ok());
        assert!(!unchanged.updated);

        let edited = DOC.replace("## Launch {#launch}\n", "## Launch {#launch}\n\nIntro line.\n");
        fs::write(dir.path().join("plan/roadmap.md"), &edited).unwrap();
        events.lock().unwrap().clear();

        let moved = reanchor(&ctx, &ann.meta.id).unwrap();
        let (start, end) = moved.anchor_match.range().unwrap();
        assert_eq!(&edited[start..end], "ship it");
        assert!(start > edited.find("Intro line.").unwrap());
        assert!(moved.updated);
        assert_eq!(
            types(&events),
            vec![EventType::IndexUpdated, EventType::AnnotationChanged]
        );
    }

    #[test]
    fn test_reanchor_missing_is_data() {
        let (dir, ctx, _events) = setup();
        let ann = create_annotation(&ctx, selection(AnchorV1::quote("ship it").with_section("risks")))
            .unwrap();

        fs::write(dir.path().join("plan/roadmap.md"), "# Plan\n\nall gone\n").unwrap();
        let result = reanchor(&ctx, &ann.meta.id).unwrap();
        assert_eq!(result.anchor_match, AnchorMatch::Missing);
        assert!(!result.updated);
        assert_eq!(ctx.annotations.get(&ann.meta.id).unwrap().unwrap(), ann);
    }

    #[test]
    fn test_reanchor_rejects_file_targets() {
        let (_dir, ctx, _events) = setup();
        let ann = create_annotation(
            &ctx,
            Annotation::new(
                "plan/roadmap.md".to_string(),
                AnnotationTarget::File,
                AnnotationKind::Todo,
                "Review".to_string(),
            ),
        )
        .unwrap();
        let err = reanchor(&ctx, &ann.meta.id).unwrap_err();
        assert_eq!(err.error_code().as_str(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_cycle_lifecycle() {
        let (_dir, ctx, events) = setup();
        let ann = create_annotation(&ctx, selection(AnchorV1::quote("ship it").with_section("risks")))
            .unwrap();
        let cycle = create_cycle(&ctx, "Review 1").unwrap();

        let ids = vec![ann.meta.id.clone(), ann.meta.id.clone()];
        let updated = add_to_cycle(&ctx, &cycle.meta.id, &ids).unwrap();
        assert_eq!(updated.annotation_ids, vec![ann.meta.id.clone()]);
        let linked = ctx.annotations.require(&ann.meta.id).unwrap();
        assert_eq!(linked.cycle_id.as_deref(), Some(cycle.meta.id.as_str()));

        let closed = close_cycle(&ctx, &cycle.meta.id).unwrap();
        assert!(closed.closed_at.is_some());

        let err = add_to_cycle(&ctx, &cycle.meta.id, &ids).unwrap_err();
        assert_eq!(err.error_code().as_str(), "LOCKED");
        let err = close_cycle(&ctx, &cycle.meta.id).unwrap_err();
        assert_eq!(err.error_code().as_str(), "LOCKED");

        assert!(types(&events).contains(&EventType::CycleChanged));
    }

    #[test]
    fn test_add_to_cycle_tags_annotations_before_cycle() {
        let (_dir, ctx, events) = setup();
        let ann = create_annotation(&ctx, selection(AnchorV1::quote("ship it").with_section("risks")))
            .unwrap();
        let cycle = create_cycle(&ctx, "Review").unwrap();
        events.lock().unwrap().clear();

        add_to_cycle(&ctx, &cycle.meta.id, &[ann.meta.id.clone()]).unwrap();

        assert_eq!(
            types(&events),
            vec![EventType::AnnotationChanged, EventType::CycleChanged]
        );
    }

    #[test]
    fn test_add_unknown_annotation_writes_nothing() {
        let (_dir, ctx, _events) = setup();
        let cycle = create_cycle(&ctx, "Review").unwrap();
        let err = add_to_cycle(&ctx, &cycle.meta.id, &["ann_000000000000".to_string()]).unwrap_err();
        assert_eq!(err.error_code().as_str(), "NOT_FOUND");
        assert!(ctx.cycles.require(&cycle.meta.id).unwrap().annotation_ids.is_empty());
    }

    #[test]
    fn test_bundle_and_revision() {
        let (_dir, ctx, events) = setup();
        let cycle = create_cycle(&ctx, "Review").unwrap();

        let bundle = record_bundle(&ctx, &cycle.meta.id, BundleFormat::Markdown, "# Out\n".into())
            .unwrap();
        assert_eq!(bundle.annotation_count, 0);

        let commit = CommitInfo {
            sha: "abc1234".to_string(),
            author: "dev".to_string(),
            message: "Implement plan".to_string(),
            committed_at: None,
        };
        let revision = record_revision(
            &ctx,
            &cycle.meta.id,
            commit,
            "diff --git".to_string(),
            vec!["plan/roadmap.md".to_string()],
        )
        .unwrap();
        assert_eq!(revision.cycle_id, cycle.meta.id);

        let types = types(&events);
        assert!(types.contains(&EventType::BundleChanged));
        assert!(types.contains(&EventType::RevisionChanged));
    }

    #[test]
    fn test_update_and_archive() {
        let (_dir, ctx, _events) = setup();
        let ann = create_annotation(&ctx, selection(AnchorV1::quote("ship it").with_section("risks")))
            .unwrap();

        let updated = update_annotation(&ctx, &ann.meta.id, &json!({"tags": ["infra"]})).unwrap();
        assert_eq!(updated.tags, vec!["infra".to_string()]);

        let archived = archive_annotation(&ctx, &ann.meta.id).unwrap();
        assert_eq!(archived.status, AnnotationStatus::Archived);
        assert_eq!(ctx.annotations.list().unwrap().len(), 1);
    }

    #[test]
    fn test_node_meta_emits_nothing() {
        let (_dir, ctx, events) = setup();
        let mut fields = serde_json::Map::new();
        fields.insert("collapsed".to_string(), json!(true));
        let node = set_node_meta(&ctx, "plan/roadmap.md#risks", fields).unwrap();
        assert_eq!(node.meta.id, NodeMeta::id_for("plan/roadmap.md#risks"));
        assert!(events.lock().unwrap().is_empty());
    }
}
