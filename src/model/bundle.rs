//! Bundle model.
//!
//! A bundle is the rendered export of a cycle. Rendering happens outside the
//! core; the bundle only stores the result.

use serde::{Deserialize, Serialize};

use super::record::RecordMeta;

/// Bundle payload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleFormat {
    #[default]
    Markdown,
    Text,
    Json,
}

/// A rendered bundle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    #[serde(flatten)]
    pub meta: RecordMeta,

    pub cycle_id: String,

    pub format: BundleFormat,

    /// Rendered content
    pub payload: String,

    #[serde(default)]
    pub annotation_count: usize,
}

impl Bundle {
    pub const SCHEMA_VERSION: u32 = 1;

    pub fn new(cycle_id: String, format: BundleFormat, payload: String) -> Self {
        Self {
            meta: RecordMeta::draft(Self::SCHEMA_VERSION),
            cycle_id,
            format,
            payload,
            annotation_count: 0,
        }
    }
}
