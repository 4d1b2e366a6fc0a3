//! Record validation and input normalization.
//!
//! Each record kind has an explicit validator returning
//! `Result<(), ValidationError>`. Enum fields are already enforced by the
//! typed model at deserialization time; validators check the rules serde
//! cannot express (non-empty strings, uniqueness, id shapes, cross-field
//! consistency).
//!
//! Input normalization follows a three-tier resolution: exact match →
//! synonym lookup → error with suggestion.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::model::{
    Annotation, AnnotationStatus, AnnotationTarget, Bundle, Cycle, CycleStatus, NodeMeta,
    Priority, RecordKind, RecordMeta, Revision, node_meta::NODE_META_ID_LEN,
};

// ── Validation error ─────────────────────────────────────────

/// A field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

type Check = Result<(), ValidationError>;

fn non_empty(field: &str, value: &str) -> Check {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    Ok(())
}

fn unique_non_empty(field: &str, values: &[String]) -> Check {
    let mut seen = HashSet::new();
    for value in values {
        non_empty(field, value)?;
        if !seen.insert(value.as_str()) {
            return Err(ValidationError::new(field, format!("duplicate value '{value}'")));
        }
    }
    Ok(())
}

// ── Ids ──────────────────────────────────────────────────────

/// Whether `id` is a well-formed id for `kind`.
///
/// Ids double as file names, so this also rules out path separators.
#[must_use]
pub fn is_valid_id(kind: RecordKind, id: &str) -> bool {
    if kind == RecordKind::NodeMeta {
        return id.len() == NODE_META_ID_LEN && id.bytes().all(|b| b.is_ascii_hexdigit());
    }
    let Some(rest) = id
        .strip_prefix(kind.id_prefix())
        .and_then(|r| r.strip_prefix('_'))
    else {
        return false;
    };
    !rest.is_empty() && rest.len() <= 32 && rest.bytes().all(|b| b.is_ascii_alphanumeric())
}

fn validate_meta(kind: RecordKind, meta: &RecordMeta) -> Check {
    if meta.schema_version == 0 {
        return Err(ValidationError::new("schemaVersion", "must be at least 1"));
    }
    if !is_valid_id(kind, &meta.id) {
        return Err(ValidationError::new(
            "id",
            format!("'{}' is not a valid {kind} id", meta.id),
        ));
    }
    if meta.updated_at < meta.created_at {
        return Err(ValidationError::new("updatedAt", "must not precede createdAt"));
    }
    Ok(())
}

// ── Per-kind validators ──────────────────────────────────────

/// Validate an annotation.
pub fn validate_annotation(ann: &Annotation) -> Check {
    validate_meta(RecordKind::Annotation, &ann.meta)?;
    non_empty("path", &ann.path)?;
    if ann.path.starts_with('/') {
        return Err(ValidationError::new("path", "must be relative"));
    }
    non_empty("body", &ann.body)?;
    unique_non_empty("tags", &ann.tags)?;
    for link in &ann.work_links {
        non_empty("workLinks.label", &link.label)?;
        non_empty("workLinks.url", &link.url)?;
    }
    if let Some(cycle_id) = &ann.cycle_id
        && !is_valid_id(RecordKind::Cycle, cycle_id)
    {
        return Err(ValidationError::new("cycleId", "is not a valid cycle id"));
    }

    match &ann.target {
        AnnotationTarget::File => {}
        AnnotationTarget::Section { section_id } => non_empty("target.sectionId", section_id)?,
        AnnotationTarget::Selection {
            quote,
            anchor_v1,
            section_id_hint,
        } => {
            non_empty("target.quote", quote)?;
            if anchor_v1.quote != *quote {
                return Err(ValidationError::new(
                    "target.anchorV1.quote",
                    "must equal target.quote",
                ));
            }
            if let Some(hint) = section_id_hint {
                non_empty("target.sectionIdHint", hint)?;
            }
        }
    }
    Ok(())
}

/// Validate a cycle.
pub fn validate_cycle(cycle: &Cycle) -> Check {
    validate_meta(RecordKind::Cycle, &cycle.meta)?;
    non_empty("title", &cycle.title)?;
    unique_non_empty("annotationIds", &cycle.annotation_ids)?;
    for id in &cycle.annotation_ids {
        if !is_valid_id(RecordKind::Annotation, id) {
            return Err(ValidationError::new(
                "annotationIds",
                format!("'{id}' is not an annotation id"),
            ));
        }
    }
    match (cycle.status, cycle.closed_at) {
        (CycleStatus::Closed, None) => {
            Err(ValidationError::new("closedAt", "required when status is closed"))
        }
        (CycleStatus::Open, Some(_)) => {
            Err(ValidationError::new("closedAt", "only allowed when status is closed"))
        }
        _ => Ok(()),
    }
}

/// Validate a bundle.
pub fn validate_bundle(bundle: &Bundle) -> Check {
    validate_meta(RecordKind::Bundle, &bundle.meta)?;
    if !is_valid_id(RecordKind::Cycle, &bundle.cycle_id) {
        return Err(ValidationError::new("cycleId", "is not a valid cycle id"));
    }
    non_empty("payload", &bundle.payload)
}

/// Validate a revision.
pub fn validate_revision(rev: &Revision) -> Check {
    validate_meta(RecordKind::Revision, &rev.meta)?;
    if !is_valid_id(RecordKind::Cycle, &rev.cycle_id) {
        return Err(ValidationError::new("cycleId", "is not a valid cycle id"));
    }
    let sha = &rev.commit.sha;
    if !(7..=64).contains(&sha.len()) || !sha.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ValidationError::new("commit.sha", "must be 7-64 hex characters"));
    }
    non_empty("commit.author", &rev.commit.author)?;
    non_empty("commit.message", &rev.commit.message)?;
    unique_non_empty("paths", &rev.paths)
}

/// Validate node metadata. The id must be derived from the node id.
pub fn validate_node_meta(node: &NodeMeta) -> Check {
    validate_meta(RecordKind::NodeMeta, &node.meta)?;
    non_empty("nodeId", &node.node_id)?;
    if node.meta.id != NodeMeta::id_for(&node.node_id) {
        return Err(ValidationError::new("id", "does not match hash of nodeId"));
    }
    Ok(())
}

// ── Valid value sets and synonyms ────────────────────────────

pub static VALID_STATUSES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    ["open", "in_progress", "blocked", "done", "archived"]
        .into_iter()
        .collect()
});

pub static STATUS_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("todo", "open"),
        ("new", "open"),
        ("pending", "open"),
        ("wip", "in_progress"),
        ("working", "in_progress"),
        ("active", "in_progress"),
        ("started", "in_progress"),
        ("waiting", "blocked"),
        ("stuck", "blocked"),
        ("closed", "done"),
        ("complete", "done"),
        ("completed", "done"),
        ("resolved", "done"),
        ("finished", "done"),
        ("archive", "archived"),
        ("hidden", "archived"),
    ]
    .into_iter()
    .collect()
});

pub static PRIORITY_SYNONYMS: LazyLock<HashMap<&str, Priority>> = LazyLock::new(|| {
    [
        ("low", Priority::Low),
        ("minor", Priority::Low),
        ("trivial", Priority::Low),
        ("p3", Priority::Low),
        ("medium", Priority::Medium),
        ("normal", Priority::Medium),
        ("default", Priority::Medium),
        ("p2", Priority::Medium),
        ("high", Priority::High),
        ("important", Priority::High),
        ("p1", Priority::High),
        ("critical", Priority::Critical),
        ("crit", Priority::Critical),
        ("urgent", Priority::Critical),
        ("p0", Priority::Critical),
    ]
    .into_iter()
    .collect()
});

/// Normalize a status string via exact match or synonym lookup.
///
/// Returns the status, or the original input with an optional suggestion.
pub fn normalize_status(input: &str) -> Result<AnnotationStatus, (String, Option<String>)> {
    let lower = input.trim().to_lowercase().replace('-', "_");

    let canonical = if VALID_STATUSES.contains(lower.as_str()) {
        Some(lower.as_str())
    } else {
        STATUS_SYNONYMS.get(lower.as_str()).copied()
    };

    if let Some(canonical) = canonical {
        return serde_json::from_value(serde_json::Value::String(canonical.to_string()))
            .map_err(|_| (input.to_string(), None));
    }

    let suggestion = find_closest_match(&lower, &VALID_STATUSES, &STATUS_SYNONYMS);
    Err((input.to_string(), suggestion))
}

/// Normalize a priority from a name, synonym or P-notation.
pub fn normalize_priority(input: &str) -> Result<Priority, (String, Option<String>)> {
    let lower = input.trim().to_lowercase();
    PRIORITY_SYNONYMS.get(lower.as_str()).copied().ok_or_else(|| {
        (
            input.to_string(),
            Some("Use low, medium, high, critical or P0-P3".to_string()),
        )
    })
}

/// Find the closest matching value across valid set and synonyms.
fn find_closest_match(
    input: &str,
    valid: &HashSet<&str>,
    synonyms: &HashMap<&str, &str>,
) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;

    for &v in valid.iter().chain(synonyms.keys()) {
        let dist = levenshtein_distance(input, v);
        if dist <= 3 && best.is_none_or(|(_, d)| dist < d) {
            // Synonyms suggest what they map to
            best = Some((synonyms.get(v).copied().unwrap_or(v), dist));
        }
    }

    best.map(|(v, _)| v.to_string())
}

// ── Levenshtein distance ─────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let a_len = a.len();
    let b_len = b.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for i in 1..=a_len {
        curr[0] = i;
        for j in 1..=b_len {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1) // deletion
                .min(curr[j - 1] + 1) // insertion
                .min(prev[j - 1] + cost); // substitution
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Find existing ids similar to the searched id.
///
/// Returns up to `max` suggestions with edit distance ≤ 3,
/// sorted by distance then alphabetically.
pub fn find_similar_ids(searched: &str, existing: &[String], max: usize) -> Vec<String> {
    let mut candidates: Vec<(usize, &str)> = existing
        .iter()
        .map(|id| (levenshtein_distance(searched, id), id.as_str()))
        .filter(|(dist, _)| *dist <= 3)
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    candidates
        .into_iter()
        .take(max)
        .map(|(_, id)| id.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnchorV1, AnnotationKind, CommitInfo};
    use chrono::Utc;

    fn stamped(mut meta: RecordMeta, id: &str) -> RecordMeta {
        let now = Utc::now();
        meta.id = id.to_string();
        meta.created_at = now;
        meta.updated_at = now;
        meta
    }

    fn annotation(target: AnnotationTarget) -> Annotation {
        let mut ann = Annotation::new(
            "plan/a.md".to_string(),
            target,
            AnnotationKind::Note,
            "body".to_string(),
        );
        ann.meta = stamped(ann.meta, "ann_0123456789ab");
        ann
    }

    #[test]
    fn test_is_valid_id() {
        assert!(is_valid_id(RecordKind::Annotation, "ann_0123456789ab"));
        assert!(!is_valid_id(RecordKind::Annotation, "cyc_0123456789ab"));
        assert!(!is_valid_id(RecordKind::Annotation, "ann_../../etc"));
        assert!(!is_valid_id(RecordKind::Annotation, "ann_"));
        assert!(is_valid_id(RecordKind::NodeMeta, &NodeMeta::id_for("node-1")));
        assert!(!is_valid_id(RecordKind::NodeMeta, "abc"));
    }

    #[test]
    fn test_validate_annotation_accepts_valid() {
        assert!(validate_annotation(&annotation(AnnotationTarget::File)).is_ok());
    }

    #[test]
    fn test_validate_annotation_rejects_empty_body() {
        let mut ann = annotation(AnnotationTarget::File);
        ann.body = "   ".to_string();
        assert_eq!(validate_annotation(&ann).unwrap_err().field, "body");
    }

    #[test]
    fn test_validate_annotation_rejects_quote_mismatch() {
        let ann = annotation(AnnotationTarget::Selection {
            quote: "a".to_string(),
            anchor_v1: AnchorV1::quote("b"),
            section_id_hint: None,
        });
        assert_eq!(
            validate_annotation(&ann).unwrap_err().field,
            "target.anchorV1.quote"
        );
    }

    #[test]
    fn test_validate_annotation_rejects_duplicate_tags() {
        let ann = annotation(AnnotationTarget::File)
            .with_tags(vec!["x".to_string(), "x".to_string()]);
        assert_eq!(validate_annotation(&ann).unwrap_err().field, "tags");
    }

    #[test]
    fn test_validate_cycle_closed_at_consistency() {
        let mut cycle = Cycle::new("Review 1".to_string());
        cycle.meta = stamped(cycle.meta, "cyc_0123456789ab");
        assert!(validate_cycle(&cycle).is_ok());

        cycle.status = CycleStatus::Closed;
        assert_eq!(validate_cycle(&cycle).unwrap_err().field, "closedAt");

        cycle.closed_at = Some(Utc::now());
        assert!(validate_cycle(&cycle).is_ok());
    }

    #[test]
    fn test_validate_revision_sha() {
        let commit = CommitInfo {
            sha: "xyz".to_string(),
            author: "dev".to_string(),
            message: "fix".to_string(),
            committed_at: None,
        };
        let mut rev = Revision::new("cyc_0123456789ab".to_string(), commit, String::new());
        rev.meta = stamped(rev.meta, "rev_0123456789ab");
        assert_eq!(validate_revision(&rev).unwrap_err().field, "commit.sha");

        rev.commit.sha = "abc1234".to_string();
        assert!(validate_revision(&rev).is_ok());
    }

    #[test]
    fn test_validate_node_meta_id_must_match() {
        let mut node = NodeMeta::new("plan/a.md#intro".to_string());
        node.meta = stamped(node.meta, &NodeMeta::id_for("something-else"));
        assert_eq!(validate_node_meta(&node).unwrap_err().field, "id");

        node.meta.id = NodeMeta::id_for("plan/a.md#intro");
        assert!(validate_node_meta(&node).is_ok());
    }

    #[test]
    fn test_normalize_status() {
        assert_eq!(normalize_status("open"), Ok(AnnotationStatus::Open));
        assert_eq!(normalize_status("wip"), Ok(AnnotationStatus::InProgress));
        assert_eq!(normalize_status("in-progress"), Ok(AnnotationStatus::InProgress));
        assert_eq!(normalize_status("CLOSED"), Ok(AnnotationStatus::Done));
        let (input, suggestion) = normalize_status("blockd").unwrap_err();
        assert_eq!(input, "blockd");
        assert_eq!(suggestion.as_deref(), Some("blocked"));
    }

    #[test]
    fn test_normalize_priority() {
        assert_eq!(normalize_priority("high"), Ok(Priority::High));
        assert_eq!(normalize_priority("P0"), Ok(Priority::Critical));
        assert!(normalize_priority("nonsense").is_err());
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abd"), 1);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_find_similar_ids() {
        let ids = vec![
            "ann_a1b2".to_string(),
            "ann_a1b3".to_string(),
            "ann_zzzzzzzz".to_string(),
        ];
        let result = find_similar_ids("ann_a1b1", &ids, 3);
        assert_eq!(result, vec!["ann_a1b2".to_string(), "ann_a1b3".to_string()]);
    }
}
