//! Revision model.
//!
//! A revision records the commit that implemented (part of) a cycle,
//! together with its patch text. The git plumbing that produces these
//! values lives outside the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::RecordMeta;

/// Commit metadata captured with a revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub sha: String,
    pub author: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed_at: Option<DateTime<Utc>>,
}

/// A revision record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    #[serde(flatten)]
    pub meta: RecordMeta,

    pub cycle_id: String,

    pub commit: CommitInfo,

    /// Unified diff text
    pub patch: String,

    /// Plan paths touched by the patch
    #[serde(default)]
    pub paths: Vec<String>,
}

impl Revision {
    pub const SCHEMA_VERSION: u32 = 1;

    pub fn new(cycle_id: String, commit: CommitInfo, patch: String) -> Self {
        Self {
            meta: RecordMeta::draft(Self::SCHEMA_VERSION),
            cycle_id,
            commit,
            patch,
            paths: Vec::new(),
        }
    }
}
