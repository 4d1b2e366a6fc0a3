//! Annotation model.
//!
//! Annotations are todos, notes and risks attached to a plan document: the
//! whole file, one heading, or a quoted span of text.

use serde::{Deserialize, Serialize};

use super::anchor::AnnotationTarget;
use super::record::RecordMeta;

/// Annotation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Todo,
    #[default]
    Note,
    Risk,
}

impl AnnotationKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Note => "note",
            Self::Risk => "risk",
        }
    }
}

/// Annotation status values.
///
/// Closure is a status transition; annotations are never deleted in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationStatus {
    #[default]
    Open,
    InProgress,
    Blocked,
    Done,
    Archived,
}

impl AnnotationStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Done => "done",
            Self::Archived => "archived",
        }
    }

    /// Whether the annotation still needs attention.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::InProgress | Self::Blocked)
    }
}

/// Priority values, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// A link from an annotation to external work (ticket, PR, doc).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkLink {
    pub label: String,
    pub url: String,
}

/// An annotation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    #[serde(flatten)]
    pub meta: RecordMeta,

    /// Plan document path, relative to the project root
    pub path: String,

    /// What the annotation is attached to
    pub target: AnnotationTarget,

    pub kind: AnnotationKind,

    /// Free-form markdown body
    pub body: String,

    pub status: AnnotationStatus,

    pub priority: Priority,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub work_links: Vec<WorkLink>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Cycle this annotation was pulled into, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_id: Option<String>,
}

impl Annotation {
    pub const SCHEMA_VERSION: u32 = 1;

    /// Create a new annotation draft with default values.
    pub fn new(path: String, target: AnnotationTarget, kind: AnnotationKind, body: String) -> Self {
        Self {
            meta: RecordMeta::draft(Self::SCHEMA_VERSION),
            path,
            target,
            kind,
            body,
            status: AnnotationStatus::Open,
            priority: Priority::Medium,
            tags: Vec::new(),
            work_links: Vec::new(),
            author: None,
            cycle_id: None,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub fn with_author(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }

    #[must_use]
    pub fn with_work_link(mut self, label: &str, url: &str) -> Self {
        self.work_links.push(WorkLink {
            label: label.to_string(),
            url: url.to_string(),
        });
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.meta.id
    }
}
