//! Per-node metadata keyed by a caller-supplied node id.
//!
//! The record id is a hash of the node id, so lookups need no index and
//! repeated writes for the same node land in the same file.

use serde::{Deserialize, Serialize};

use super::record::RecordMeta;

/// Length of the hex id derived from `sha256(node_id)`.
pub const NODE_META_ID_LEN: usize = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    #[serde(flatten)]
    pub meta: RecordMeta,

    pub node_id: String,

    /// Arbitrary UI/state fields for the node
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl NodeMeta {
    pub const SCHEMA_VERSION: u32 = 1;

    pub fn new(node_id: String) -> Self {
        Self {
            meta: RecordMeta::draft(Self::SCHEMA_VERSION),
            node_id,
            fields: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: &str, value: serde_json::Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    /// Record id for a node id.
    #[must_use]
    pub fn id_for(node_id: &str) -> String {
        let mut id = crate::store::hash::sha256_hex(node_id.as_bytes());
        id.truncate(NODE_META_ID_LEN);
        id
    }
}
