//! In-memory catalog of indexed documents.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::model::IndexedFile;

/// Map of plan-relative path → latest [`IndexedFile`].
///
/// Entries are replaced wholesale; readers get an `Arc` snapshot that a
/// concurrent reindex never mutates.
#[derive(Debug, Default)]
pub struct Catalog {
    files: Mutex<BTreeMap<String, Arc<IndexedFile>>>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<Arc<IndexedFile>> {
        self.lock().get(path).cloned()
    }

    /// Fingerprint of the cached entry, if any.
    #[must_use]
    pub fn sha256(&self, path: &str) -> Option<String> {
        self.lock().get(path).map(|f| f.sha256.clone())
    }

    /// Insert or replace the entry for `file.path`. Returns the previous one.
    pub fn insert(&self, file: IndexedFile) -> Option<Arc<IndexedFile>> {
        self.lock().insert(file.path.clone(), Arc::new(file))
    }

    pub fn remove(&self, path: &str) -> Option<Arc<IndexedFile>> {
        self.lock().remove(path)
    }

    /// All entries, ordered by path.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<IndexedFile>> {
        self.lock().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<IndexedFile>>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::document::index;

    #[test]
    fn test_insert_replaces_wholesale() {
        let catalog = Catalog::new();
        assert!(catalog.insert(index("# A\n", "plan/a.md")).is_none());

        let held = catalog.get("plan/a.md").unwrap();
        let previous = catalog.insert(index("# B\n", "plan/a.md")).unwrap();

        assert_eq!(previous.sha256, held.sha256);
        assert_eq!(held.headings[0].title, "A");
        assert_eq!(catalog.get("plan/a.md").unwrap().headings[0].title, "B");
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_snapshot_is_ordered_and_remove() {
        let catalog = Catalog::new();
        catalog.insert(index("", "plan/b.md"));
        catalog.insert(index("", "plan/a.md"));

        let paths: Vec<_> = catalog.snapshot().iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec!["plan/a.md".to_string(), "plan/b.md".to_string()]);

        assert!(catalog.remove("plan/a.md").is_some());
        assert_eq!(catalog.sha256("plan/a.md"), None);
        catalog.clear();
        assert!(catalog.is_empty());
    }
}
