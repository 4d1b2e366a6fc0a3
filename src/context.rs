//! The explicitly constructed application context.
//!
//! Holds everything that would otherwise be a process-wide singleton: the
//! configuration, the path guard, the document catalog, the event bus and
//! notifier, and one [`RecordStore`] per record kind. Created with
//! [`AppContext::init`] and torn down with [`AppContext::dispose`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{self, ProjectConfig};
use crate::error::{Error, Result};
use crate::events::{ChangeEvent, EventBus, Notifier};
use crate::index::{self, Catalog};
use crate::model::{Annotation, Bundle, Cycle, IndexedFile, NodeMeta, Revision};
use crate::path_guard::PathGuard;
use crate::store::{Record, RecordStore, hash};

/// Shared state for one project.
#[derive(Debug)]
pub struct AppContext {
    project_root: PathBuf,
    config: ProjectConfig,
    guard: PathGuard,
    catalog: Catalog,
    bus: Arc<EventBus>,
    notifier: Arc<Notifier>,

    pub annotations: RecordStore<Annotation>,
    pub cycles: RecordStore<Cycle>,
    pub bundles: RecordStore<Bundle>,
    pub revisions: RecordStore<Revision>,
    pub node_meta: RecordStore<NodeMeta>,
}

impl AppContext {
    /// Build the context for `project_root` from its on-disk config.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid config file, or an I/O
    /// error if the project root does not exist.
    pub fn init(project_root: &Path) -> Result<Self> {
        let config = ProjectConfig::load(project_root)?;
        Self::with_config(project_root, config)
    }

    /// Build the context with an explicit config.
    ///
    /// # Errors
    ///
    /// Same as [`AppContext::init`].
    pub fn with_config(project_root: &Path, config: ProjectConfig) -> Result<Self> {
        let guard = PathGuard::new(project_root, &config.effective_allowed_roots())?;
        let project_root = guard.root().to_path_buf();
        let meta_root = config::metadata_dir(&project_root);
        let read_only = config.read_only;

        let bus = Arc::new(EventBus::new());
        let notifier = Arc::new(Notifier::new());
        notifier.attach(&bus);

        info!(
            project = %project_root.display(),
            plan_root = %config.plan_root,
            read_only,
            "Context initialized"
        );

        Ok(Self {
            annotations: RecordStore::open(&meta_root, read_only),
            cycles: RecordStore::open(&meta_root, read_only),
            bundles: RecordStore::open(&meta_root, read_only),
            revisions: RecordStore::open(&meta_root, read_only),
            node_meta: RecordStore::open(&meta_root, read_only),
            project_root,
            config,
            guard,
            catalog: Catalog::new(),
            bus,
            notifier,
        })
    }

    /// Release subscribers and cached state.
    pub fn dispose(self) {
        self.bus.clear();
        self.notifier.close();
        self.catalog.clear();
        debug!(project = %self.project_root.display(), "Context disposed");
    }

    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    #[must_use]
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    #[must_use]
    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    #[must_use]
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Absolute plan root.
    #[must_use]
    pub fn plan_root(&self) -> PathBuf {
        self.project_root.join(&self.config.plan_root)
    }

    /// Absolute plan root, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `PLAN_ROOT_MISSING`.
    pub fn require_plan_root(&self) -> Result<PathBuf> {
        let root = self.plan_root();
        if root.is_dir() {
            Ok(root)
        } else {
            Err(Error::PlanRootMissing { path: root })
        }
    }

    /// Emit an event on the context's bus.
    pub fn emit(&self, event: &ChangeEvent) {
        self.bus.emit(event);
    }

    /// Emit the `*:changed` event for a record, if its kind has one.
    pub fn emit_record<R: Record>(&self, record: &R) {
        if let Some(event) = ChangeEvent::record_changed(record) {
            self.bus.emit(&event);
        }
    }

    /// Current text and index of a document.
    ///
    /// Reuses the catalog entry when its fingerprint matches the text on
    /// disk; otherwise indexes the text, refreshes the catalog and emits
    /// `index:updated`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`index::read_document`].
    pub fn document(&self, rel_path: &str) -> Result<(String, Arc<IndexedFile>)> {
        let (text, mtime_ms) = index::read_document(&self.guard, rel_path)?;
        let sha = hash::sha256_hex(text.as_bytes());

        if let Some(cached) = self.catalog.get(rel_path)
            && cached.sha256 == sha
        {
            return Ok((text, cached));
        }

        let file = index::index(&text, rel_path).with_mtime(mtime_ms);
        let event = ChangeEvent::index_updated(&file);
        self.catalog.insert(file);
        self.emit(&event);

        let file = self
            .catalog
            .get(rel_path)
            .ok_or_else(|| Error::Other(format!("catalog lost {rel_path}")))?;
        Ok((text, file))
    }
}
