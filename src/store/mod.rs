//! One-file-per-record JSON persistence.
//!
//! A [`RecordStore`] is instantiated per record kind and owns one directory
//! under the metadata root (`annotations/`, `cycles/`, ...). It provides:
//! - Schema validation on every write (no partial persistence)
//! - Atomic temp-then-rename writes
//! - Resilient listing: one corrupt file never blanks out a listing
//!
//! There are no cross-record transactions and no optimistic concurrency
//! token. Two updates to the same id race; the last writer wins.
//!
//! # Submodules
//!
//! - [`file`] - Atomic writes and stable JSON
//! - [`hash`] - SHA-256 helpers
//! - [`records`] - `Record` impls for each model

pub mod file;
pub mod hash;
mod records;

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{NodeMeta, RecordKind, RecordMeta};
use crate::validate::{self, ValidationError};

/// A persisted record kind.
pub trait Record: Serialize + DeserializeOwned + Clone + std::fmt::Debug {
    const KIND: RecordKind;
    const SCHEMA_VERSION: u32;

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    /// Id for a record about to be created. Random unless overridden.
    fn derive_id(&self) -> String {
        let random = uuid::Uuid::new_v4().simple().to_string();
        format!("{}_{}", Self::KIND.id_prefix(), &random[..12])
    }

    /// Field-level validation of a complete record.
    ///
    /// # Errors
    ///
    /// Returns the first failing field.
    fn validate(&self) -> std::result::Result<(), ValidationError>;
}

/// Why a record file could not be loaded.
enum LoadFailure {
    Io(std::io::Error),
    Parse(String),
    Invalid(ValidationError),
    NewerSchema(u32),
}

impl LoadFailure {
    fn describe(&self) -> String {
        match self {
            Self::Io(e) => e.to_string(),
            Self::Parse(msg) => msg.clone(),
            Self::Invalid(e) => e.to_string(),
            Self::NewerSchema(v) => format!("schema version {v} is newer than supported"),
        }
    }
}

/// Schema-validated, atomically-written store for one record kind.
#[derive(Debug, Clone)]
pub struct RecordStore<R> {
    dir: PathBuf,
    read_only: bool,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> RecordStore<R> {
    /// Open the store for `R` under `meta_root`.
    ///
    /// The directory is created lazily on first write.
    pub fn open(meta_root: &Path, read_only: bool) -> Self {
        Self {
            dir: meta_root.join(R::KIND.dir_name()),
            read_only,
            _record: PhantomData,
        }
    }

    /// Directory holding this kind's record files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List all readable, valid records, most recently updated first.
    ///
    /// Files that fail to parse or validate, or that were written by a
    /// newer schema, are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory itself cannot be read.
    pub fn list(&self) -> Result<Vec<R>> {
        self.list_where(|_| true)
    }

    /// List records matching `predicate`, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory itself cannot be read.
    pub fn list_where(&self, predicate: impl Fn(&R) -> bool) -> Result<Vec<R>> {
        let mut records = Vec::new();

        for path in file::list_json_files(&self.dir)? {
            let Some(id) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            match self.load(&path, &id) {
                Ok(record) => {
                    if predicate(&record) {
                        records.push(record);
                    }
                }
                Err(failure) => {
                    debug!(
                        kind = %R::KIND,
                        path = %path.display(),
                        reason = %failure.describe(),
                        "Skipping unreadable record"
                    );
                }
            }
        }

        records.sort_by(|a, b| {
            b.meta()
                .updated_at
                .cmp(&a.meta().updated_at)
                .then_with(|| a.meta().id.cmp(&b.meta().id))
        });
        Ok(records)
    }

    /// Get a record by id, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// - `INVALID_ARGUMENT` if the id is malformed or the file is corrupt
    /// - `SCHEMA_MIGRATION_REQUIRED` if the file was written by a newer schema
    pub fn get(&self, id: &str) -> Result<Option<R>> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Ok(None);
        }

        match self.load(&path, id) {
            Ok(record) => Ok(Some(record)),
            Err(LoadFailure::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(LoadFailure::Io(e)) => Err(Error::Io(e)),
            Err(LoadFailure::Invalid(source)) => Err(Error::InvalidRecord {
                kind: R::KIND,
                source,
            }),
            Err(LoadFailure::NewerSchema(found)) => Err(Error::SchemaMigrationRequired {
                kind: R::KIND,
                id: id.to_string(),
                found,
                supported: R::SCHEMA_VERSION,
            }),
            Err(LoadFailure::Parse(msg)) => Err(Error::InvalidArgument(format!(
                "{} {id} is unreadable: {msg}",
                R::KIND
            ))),
        }
    }

    /// Get a record by id or fail with `NOT_FOUND`.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` (with similar ids when any exist) plus the errors
    /// of [`RecordStore::get`].
    pub fn require(&self, id: &str) -> Result<R> {
        if let Some(record) = self.get(id)? {
            return Ok(record);
        }

        let similar = validate::find_similar_ids(id, &self.ids(), 3);
        if similar.is_empty() {
            Err(Error::NotFound {
                kind: R::KIND,
                id: id.to_string(),
            })
        } else {
            Err(Error::NotFoundSimilar {
                kind: R::KIND,
                id: id.to_string(),
                similar,
            })
        }
    }

    /// Create a record from a draft.
    ///
    /// Assigns the id and sets `createdAt == updatedAt == now`.
    ///
    /// # Errors
    ///
    /// Returns `READ_ONLY`, `INVALID_ARGUMENT` on validation failure, or an
    /// I/O error. Nothing is written on failure.
    pub fn create(&self, mut draft: R) -> Result<R> {
        self.ensure_writable()?;

        let now = Utc::now();
        let id = draft.derive_id();
        let meta = draft.meta_mut();
        meta.id = id;
        meta.schema_version = R::SCHEMA_VERSION;
        meta.created_at = now;
        meta.updated_at = now;

        self.write(&draft)?;
        debug!(kind = %R::KIND, id = %draft.meta().id, "Created record");
        Ok(draft)
    }

    /// Merge a JSON patch over an existing record.
    ///
    /// The patch follows JSON merge-patch rules (`null` removes a field).
    /// `id`, `createdAt` and `schemaVersion` are always preserved and
    /// `updatedAt` always advances. The merged result is re-validated as a
    /// whole; an invalid merge is rejected without touching disk.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND`, `READ_ONLY`, `INVALID_ARGUMENT`, or an I/O error.
    pub fn update(&self, id: &str, patch: &Value) -> Result<R> {
        self.ensure_writable()?;
        if !patch.is_object() {
            return Err(Error::InvalidArgument(
                "patch must be a JSON object".to_string(),
            ));
        }

        let current = self.require(id)?;
        let original = serde_json::to_value(&current)?;
        let mut merged = original.clone();
        merge_patch(&mut merged, patch);
        if let (Some(merged), Some(original)) = (merged.as_object_mut(), original.as_object()) {
            for key in IDENTITY_KEYS {
                if let Some(value) = original.get(key) {
                    merged.insert(key.to_string(), value.clone());
                }
            }
        }

        let mut record: R = serde_json::from_value(merged).map_err(|e| {
            Error::InvalidArgument(format!("patch produces an invalid {}: {e}", R::KIND))
        })?;
        Self::carry_identity(&current, &mut record);

        self.write(&record)?;
        debug!(kind = %R::KIND, id, "Updated record");
        Ok(record)
    }

    /// Apply a typed mutation to an existing record.
    ///
    /// Same guarantees as [`RecordStore::update`]. If `mutate` fails,
    /// nothing is written.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, `NOT_FOUND`, `READ_ONLY`,
    /// `INVALID_ARGUMENT`, or an I/O error.
    pub fn update_with(&self, id: &str, mutate: impl FnOnce(&mut R) -> Result<()>) -> Result<R> {
        self.ensure_writable()?;

        let current = self.require(id)?;
        let mut record = current.clone();
        mutate(&mut record)?;
        Self::carry_identity(&current, &mut record);

        self.write(&record)?;
        debug!(kind = %R::KIND, id, "Updated record");
        Ok(record)
    }

    /// Physically delete a record. Only for hard cleanup paths.
    ///
    /// Returns `false` if the record did not exist.
    ///
    /// # Errors
    ///
    /// Returns `READ_ONLY`, `INVALID_ARGUMENT` for a malformed id, or an
    /// I/O error.
    pub fn remove(&self, id: &str) -> Result<bool> {
        self.ensure_writable()?;
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                warn!(kind = %R::KIND, id, "Removed record");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Ids of every record file, readable or not.
    fn ids(&self) -> Vec<String> {
        file::list_json_files(&self.dir)
            .unwrap_or_default()
            .iter()
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
            .collect()
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if !validate::is_valid_id(R::KIND, id) {
            return Err(Error::InvalidArgument(format!(
                "'{id}' is not a valid {} id",
                R::KIND
            )));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    /// Restore immutable fields from `current` and advance `updatedAt`.
    fn carry_identity(current: &R, record: &mut R) {
        let prev = current.meta();
        let meta = record.meta_mut();
        meta.id.clone_from(&prev.id);
        meta.created_at = prev.created_at;
        meta.schema_version = prev.schema_version;
        meta.updated_at = next_updated_at(prev.updated_at);
    }

    /// Validate, then atomically write.
    fn write(&self, record: &R) -> Result<()> {
        record.validate().map_err(|source| Error::InvalidRecord {
            kind: R::KIND,
            source,
        })?;
        let path = self.path_for(&record.meta().id)?;
        let json = file::to_stable_json(record)?;
        file::atomic_write(&path, json.as_bytes())?;
        Ok(())
    }

    fn load(&self, path: &Path, id: &str) -> std::result::Result<R, LoadFailure> {
        let content = fs::read_to_string(path).map_err(LoadFailure::Io)?;
        let value: Value =
            serde_json::from_str(&content).map_err(|e| LoadFailure::Parse(e.to_string()))?;

        let version = value
            .get("schemaVersion")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0);
        if version > R::SCHEMA_VERSION {
            return Err(LoadFailure::NewerSchema(version));
        }

        let record: R =
            serde_json::from_value(value).map_err(|e| LoadFailure::Parse(e.to_string()))?;
        if record.meta().id != id {
            return Err(LoadFailure::Invalid(ValidationError::new(
                "id",
                format!("'{}' does not match file name", record.meta().id),
            )));
        }
        record.validate().map_err(LoadFailure::Invalid)?;
        Ok(record)
    }
}

impl RecordStore<NodeMeta> {
    /// Metadata for a node id, if any has been stored.
    ///
    /// # Errors
    ///
    /// Same as [`RecordStore::get`].
    pub fn for_node(&self, node_id: &str) -> Result<Option<NodeMeta>> {
        self.get(&NodeMeta::id_for(node_id))
    }

    /// Merge `fields` into the node's metadata, creating it if needed.
    ///
    /// Idempotent for identical input: the record id is a hash of `node_id`.
    ///
    /// # Errors
    ///
    /// Same as [`RecordStore::create`] / [`RecordStore::update_with`].
    pub fn upsert(
        &self,
        node_id: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<NodeMeta> {
        match self.for_node(node_id)? {
            Some(existing) => self.update_with(&existing.meta.id, |node| {
                node.fields.extend(fields);
                Ok(())
            }),
            None => {
                let mut node = NodeMeta::new(node_id.to_string());
                node.fields = fields;
                self.create(node)
            }
        }
    }
}

/// Keys a merge patch can never change.
const IDENTITY_KEYS: [&str; 3] = ["id", "createdAt", "schemaVersion"];

/// `updatedAt` for a write following one stamped `prev`. Strictly increasing.
fn next_updated_at(prev: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > prev {
        now
    } else {
        prev + chrono::Duration::milliseconds(1)
    }
}

/// Apply a JSON merge patch (RFC 7386) to `target`.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AnchorV1, Annotation, AnnotationKind, AnnotationStatus, AnnotationTarget, Cycle,
        Priority,
    };
    use serde_json::json;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> RecordStore<Annotation> {
        RecordStore::open(dir.path(), false)
    }

    fn draft(body: &str) -> Annotation {
        Annotation::new(
            "plan/roadmap.md".to_string(),
            AnnotationTarget::selection(AnchorV1::quote("ship it")),
            AnnotationKind::Todo,
            body.to_string(),
        )
    }

    #[test]
    fn test_create_then_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let created = store.create(draft("first")).unwrap();
        assert!(created.meta.id.starts_with("ann_"));
        assert_eq!(created.meta.created_at, created.meta.updated_at);

        let fetched = store.get(&created.meta.id).unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[test]
    fn test_create_writes_pretty_sorted_json() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let created = store.create(draft("first")).unwrap();

        let path = store.dir().join(format!("{}.json", created.meta.id));
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("\n  \"body\": \"first\""));
        assert!(content.find("\"body\"").unwrap() < content.find("\"createdAt\"").unwrap());
    }

    #[test]
    fn test_get_missing_is_none_and_require_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert!(store.get("ann_000000000000").unwrap().is_none());
        let err = store.require("ann_000000000000").unwrap_err();
        assert_eq!(err.error_code().as_str(), "NOT_FOUND");
    }

    #[test]
    fn test_require_suggests_similar_ids() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let created = store.create(draft("first")).unwrap();

        let mut typo = created.meta.id.clone();
        typo.pop();
        typo.push(if created.meta.id.ends_with('0') { '1' } else { '0' });

        match store.require(&typo).unwrap_err() {
            Error::NotFoundSimilar { similar, .. } => assert_eq!(similar, vec![created.meta.id]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_get_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let err = store(&dir).get("../../etc/passwd").unwrap_err();
        assert_eq!(err.error_code().as_str(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_update_preserves_identity_and_advances_updated_at() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let created = store.create(draft("first")).unwrap();

        let updated = store
            .update(
                &created.meta.id,
                &json!({
                    "id": "ann_ffffffffffff",
                    "createdAt": "2001-01-01T00:00:00Z",
                    "status": "in_progress",
                    "priority": "high",
                }),
            )
            .unwrap();

        assert_eq!(updated.meta.id, created.meta.id);
        assert_eq!(updated.meta.created_at, created.meta.created_at);
        assert!(updated.meta.updated_at > created.meta.updated_at);
        assert_eq!(updated.status, AnnotationStatus::InProgress);
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(store.get(&created.meta.id).unwrap().unwrap(), updated);
    }

    #[test]
    fn test_update_ignores_malformed_identity_fields() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let created = store.create(draft("first")).unwrap();

        let updated = store
            .update(
                &created.meta.id,
                &json!({"createdAt": "yesterday", "schemaVersion": "two", "body": "second"}),
            )
            .unwrap();
        assert_eq!(updated.meta.created_at, created.meta.created_at);
        assert_eq!(updated.meta.schema_version, created.meta.schema_version);
        assert_eq!(updated.body, "second");

        let updated = store
            .update(&created.meta.id, &json!({"id": null, "body": "third"}))
            .unwrap();
        assert_eq!(updated.meta.id, created.meta.id);
        assert_eq!(store.get(&created.meta.id).unwrap().unwrap().body, "third");
    }

    #[test]
    fn test_update_rejects_invalid_merge_without_writing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let created = store.create(draft("first")).unwrap();

        let bad_enum = store.update(&created.meta.id, &json!({"status": "exploded"}));
        assert_eq!(
            bad_enum.unwrap_err().error_code().as_str(),
            "INVALID_ARGUMENT"
        );

        let empty_body = store.update(&created.meta.id, &json!({"body": ""}));
        assert_eq!(
            empty_body.unwrap_err().error_code().as_str(),
            "INVALID_ARGUMENT"
        );

        assert_eq!(store.get(&created.meta.id).unwrap().unwrap(), created);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = store(&dir)
            .update("ann_000000000000", &json!({"body": "x"}))
            .unwrap_err();
        assert_eq!(err.error_code().as_str(), "NOT_FOUND");
    }

    #[test]
    fn test_update_with_typed_mutation() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let created = store.create(draft("first")).unwrap();

        let updated = store
            .update_with(&created.meta.id, |ann| {
                ann.tags.push("infra".to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.tags, vec!["infra".to_string()]);
        assert!(updated.meta.updated_at > created.meta.updated_at);
    }

    #[test]
    fn test_list_skips_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        for i in 0..3 {
            store.create(draft(&format!("note {i}"))).unwrap();
        }
        fs::write(store.dir().join("ann_badbadbadbad.json"), "{ not json").unwrap();

        assert_eq!(store.list().unwrap().len(), 3);
    }

    #[test]
    fn test_list_skips_schema_invalid_and_newer_schema() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let created = store.create(draft("valid")).unwrap();

        let mut invalid = serde_json::to_value(&created).unwrap();
        invalid["id"] = json!("ann_111111111111");
        invalid["body"] = json!("");
        fs::write(
            store.dir().join("ann_111111111111.json"),
            invalid.to_string(),
        )
        .unwrap();

        let mut newer = serde_json::to_value(&created).unwrap();
        newer["id"] = json!("ann_222222222222");
        newer["schemaVersion"] = json!(99);
        fs::write(store.dir().join("ann_222222222222.json"), newer.to_string()).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].meta.id, created.meta.id);

        let err = store.get("ann_222222222222").unwrap_err();
        assert_eq!(err.error_code().as_str(), "SCHEMA_MIGRATION_REQUIRED");
    }

    #[test]
    fn test_list_sorted_by_updated_at_desc() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let a = store.create(draft("a")).unwrap();
        let b = store.create(draft("b")).unwrap();
        store.update(&a.meta.id, &json!({"body": "a2"})).unwrap();

        let ids: Vec<_> = store.list().unwrap().into_iter().map(|r| r.meta.id).collect();
        assert_eq!(ids, vec![a.meta.id, b.meta.id]);
    }

    #[test]
    fn test_list_where_filters() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create(draft("a")).unwrap();
        store.create(draft("b").with_priority(Priority::Critical)).unwrap();

        let critical = store
            .list_where(|a| a.priority == Priority::Critical)
            .unwrap();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].body, "b");
    }

    #[test]
    fn test_read_only_blocks_writes() {
        let dir = TempDir::new().unwrap();
        let store: RecordStore<Annotation> = RecordStore::open(dir.path(), true);
        let err = store.create(draft("a")).unwrap_err();
        assert_eq!(err.error_code().as_str(), "READ_ONLY");
        assert!(!store.dir().exists());
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store: RecordStore<Cycle> = RecordStore::open(dir.path(), false);
        let cycle = store.create(Cycle::new("Review".to_string())).unwrap();

        assert!(store.remove(&cycle.meta.id).unwrap());
        assert!(!store.remove(&cycle.meta.id).unwrap());
        assert!(store.get(&cycle.meta.id).unwrap().is_none());
    }

    #[test]
    fn test_node_meta_upsert_is_keyed_by_hash() {
        let dir = TempDir::new().unwrap();
        let store: RecordStore<NodeMeta> = RecordStore::open(dir.path(), false);

        let mut fields = serde_json::Map::new();
        fields.insert("collapsed".to_string(), json!(true));
        let first = store.upsert("plan/a.md#intro", fields).unwrap();
        assert_eq!(first.meta.id, NodeMeta::id_for("plan/a.md#intro"));

        let mut more = serde_json::Map::new();
        more.insert("pinned".to_string(), json!(true));
        let second = store.upsert("plan/a.md#intro", more).unwrap();

        assert_eq!(second.meta.id, first.meta.id);
        assert_eq!(second.meta.created_at, first.meta.created_at);
        assert_eq!(second.fields.len(), 2);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_merge_patch() {
        let mut target = json!({"a": 1, "b": {"c": 2, "d": 3}});
        merge_patch(&mut target, &json!({"a": null, "b": {"c": 5}, "e": [1]}));
        assert_eq!(target, json!({"b": {"c": 5, "d": 3}, "e": [1]}));
    }
}
