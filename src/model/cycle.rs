//! Cycle model.
//!
//! A cycle groups annotations for one round of plan review. Once closed it
//! is locked: membership no longer changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::RecordMeta;

/// Cycle status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    #[default]
    Open,
    Closed,
}

impl CycleStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// A review cycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cycle {
    #[serde(flatten)]
    pub meta: RecordMeta,

    pub title: String,

    pub status: CycleStatus,

    #[serde(default)]
    pub annotation_ids: Vec<String>,

    /// Set when the cycle is closed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Cycle {
    pub const SCHEMA_VERSION: u32 = 1;

    pub fn new(title: String) -> Self {
        Self {
            meta: RecordMeta::draft(Self::SCHEMA_VERSION),
            title,
            status: CycleStatus::Open,
            annotation_ids: Vec::new(),
            closed_at: None,
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.status == CycleStatus::Closed
    }
}
