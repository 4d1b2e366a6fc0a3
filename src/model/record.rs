//! Fields shared by every persisted record kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The record kinds persisted under the metadata root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Annotation,
    Cycle,
    Bundle,
    Revision,
    NodeMeta,
}

impl RecordKind {
    /// Machine-readable name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Annotation => "annotation",
            Self::Cycle => "cycle",
            Self::Bundle => "bundle",
            Self::Revision => "revision",
            Self::NodeMeta => "node_meta",
        }
    }

    /// Directory name under the metadata root.
    #[must_use]
    pub const fn dir_name(&self) -> &'static str {
        match self {
            Self::Annotation => "annotations",
            Self::Cycle => "cycles",
            Self::Bundle => "bundles",
            Self::Revision => "revisions",
            Self::NodeMeta => "node-meta",
        }
    }

    /// Prefix for randomly generated ids. NodeMeta ids are hashes.
    #[must_use]
    pub const fn id_prefix(&self) -> &'static str {
        match self {
            Self::Annotation => "ann",
            Self::Cycle => "cyc",
            Self::Bundle => "bun",
            Self::Revision => "rev",
            Self::NodeMeta => "",
        }
    }

    /// CLI subcommand that lists this kind (used in hints).
    #[must_use]
    pub const fn command(&self) -> &'static str {
        match self {
            Self::Annotation => "annotate",
            Self::Cycle | Self::Bundle | Self::Revision => "cycle",
            Self::NodeMeta => "node",
        }
    }

    /// Change-event type emitted when a record of this kind is written.
    #[must_use]
    pub const fn change_event(&self) -> Option<crate::events::EventType> {
        use crate::events::EventType;
        match self {
            Self::Annotation => Some(EventType::AnnotationChanged),
            Self::Cycle => Some(EventType::CycleChanged),
            Self::Bundle => Some(EventType::BundleChanged),
            Self::Revision => Some(EventType::RevisionChanged),
            Self::NodeMeta => None,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and timestamps common to all records.
///
/// Flattened into each record's JSON, so a record file reads
/// `{"schemaVersion":1,"id":"ann_...","createdAt":"...","updatedAt":"...",...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    pub schema_version: u32,
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordMeta {
    /// Placeholder meta for a record that has not been created yet.
    ///
    /// The store assigns the id and both timestamps on `create`.
    #[must_use]
    pub fn draft(schema_version: u32) -> Self {
        Self {
            schema_version,
            id: String::new(),
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        }
    }
}
