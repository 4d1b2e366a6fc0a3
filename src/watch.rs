//! Filesystem watch → reindex → event pipeline.
//!
//! - [`SingleFlight`] - at most one in-flight pass per path; overlapping
//!   triggers coalesce into one follow-up pass
//! - [`Reindexer`] - runs the indexer for a path and updates the catalog,
//!   emitting `index:updated` / `index:error`
//! - [`WatchSubscription`] - cancellable stream of debounced batches of
//!   changed plan documents
//! - [`run`] - drives a subscription into a reindexer until cancelled
//!
//! Per-file state machine:
//!
//! ```text
//! unwatched → watching → reindexing → watching
//!                 ↑           ↓
//!                 └── error ←─┘
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::events::ChangeEvent;
use crate::index;
use crate::path_guard::PathGuard;
use crate::store::hash;

// ── Single-flight ────────────────────────────────────────────

/// Result of asking to start a pass for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flight {
    /// Caller owns the pass and must call [`SingleFlight::finish`]
    Leader,
    /// A pass is already running; it will run once more when it finishes
    Coalesced,
}

/// Per-key in-flight guard.
#[derive(Debug, Default)]
pub struct SingleFlight {
    /// key → whether another pass was requested while this one ran
    inflight: Mutex<HashMap<String, bool>>,
}

impl SingleFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, key: &str) -> Flight {
        let mut inflight = self.lock();
        if let Some(pending) = inflight.get_mut(key) {
            *pending = true;
            return Flight::Coalesced;
        }
        inflight.insert(key.to_string(), false);
        Flight::Leader
    }

    /// End the leader's pass.
    ///
    /// Returns `true` if triggers arrived meanwhile: the leader keeps the
    /// flight and must run one more pass.
    pub fn finish(&self, key: &str) -> bool {
        let mut inflight = self.lock();
        match inflight.get_mut(key) {
            Some(pending) if *pending => {
                *pending = false;
                true
            }
            _ => {
                inflight.remove(key);
                false
            }
        }
    }

    #[must_use]
    pub fn in_flight(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, bool>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Reindexer ────────────────────────────────────────────────

/// Watch state of one document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum FileWatchState {
    #[default]
    Unwatched,
    Watching,
    Reindexing,
    Error {
        message: String,
    },
}

/// What a trigger did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReindexOutcome {
    /// Catalog entry replaced, `index:updated` emitted
    Indexed,
    /// Fingerprint unchanged; nothing emitted
    Unchanged,
    /// File is gone; catalog entry dropped
    Removed,
    /// Pass failed, `index:error` emitted, catalog entry kept
    Failed(String),
    /// Folded into the pass already running for this path
    Coalesced,
}

/// Totals from [`Reindexer::index_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    pub indexed: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub failed: usize,
}

impl IndexSummary {
    fn record(&mut self, outcome: &ReindexOutcome) {
        match outcome {
            ReindexOutcome::Indexed => self.indexed += 1,
            ReindexOutcome::Unchanged | ReindexOutcome::Coalesced => self.unchanged += 1,
            ReindexOutcome::Removed => self.removed += 1,
            ReindexOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Reindexes documents into the context's catalog.
#[derive(Debug)]
pub struct Reindexer {
    ctx: Arc<AppContext>,
    flights: SingleFlight,
    states: Mutex<HashMap<String, FileWatchState>>,
}

impl Reindexer {
    #[must_use]
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            flights: SingleFlight::new(),
            states: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    /// Current watch state of `path`.
    #[must_use]
    pub fn state(&self, path: &str) -> FileWatchState {
        self.lock_states().get(path).cloned().unwrap_or_default()
    }

    /// Reindex `path`, or coalesce into the pass already running for it.
    pub fn trigger(&self, path: &str) -> ReindexOutcome {
        if self.flights.begin(path) == Flight::Coalesced {
            debug!(path, "Reindex already in flight, coalescing");
            return ReindexOutcome::Coalesced;
        }

        loop {
            let outcome = self.run_pass(path);
            if !self.flights.finish(path) {
                return outcome;
            }
            debug!(path, "Running coalesced follow-up pass");
        }
    }

    /// Trigger every markdown document under the plan root, and every
    /// catalog entry whose file has disappeared.
    ///
    /// # Errors
    ///
    /// Returns `PLAN_ROOT_MISSING` if the plan root does not exist.
    pub fn index_all(&self) -> Result<IndexSummary> {
        let plan_root = self.ctx.require_plan_root()?;
        let guard = self.ctx.guard();

        let mut seen = BTreeSet::new();
        let walker = WalkDir::new(&plan_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if entry.file_type().is_file()
                && is_markdown(entry.path())
                && let Some(rel) = guard.relative(entry.path())
            {
                seen.insert(rel);
            }
        }
        for file in self.ctx.catalog().snapshot() {
            seen.insert(file.path.clone());
        }

        let mut summary = IndexSummary::default();
        for path in &seen {
            summary.record(&self.trigger(path));
        }
        info!(
            indexed = summary.indexed,
            unchanged = summary.unchanged,
            removed = summary.removed,
            failed = summary.failed,
            "Index pass complete"
        );
        Ok(summary)
    }

    fn run_pass(&self, path: &str) -> ReindexOutcome {
        self.set_state(path, FileWatchState::Reindexing);
        let catalog = self.ctx.catalog();

        let (text, mtime_ms) = match index::read_document(self.ctx.guard(), path) {
            Ok(doc) => doc,
            Err(Error::DocumentNotFound { .. }) => {
                self.lock_states().remove(path);
                if catalog.remove(path).is_some() {
                    info!(path, "Document removed");
                    self.ctx.emit(&ChangeEvent::index_removed(path));
                }
                return ReindexOutcome::Removed;
            }
            Err(e) => return self.fail(path, &e),
        };

        let sha = hash::sha256_hex(text.as_bytes());
        if !hash::has_changed(&sha, catalog.sha256(path).as_deref()) {
            self.set_state(path, FileWatchState::Watching);
            debug!(path, "Content unchanged, skipping");
            return ReindexOutcome::Unchanged;
        }

        let file = index::index(&text, path).with_mtime(mtime_ms);
        let event = ChangeEvent::index_updated(&file);
        info!(path, headings = file.headings.len(), "Reindexed");
        catalog.insert(file);
        self.set_state(path, FileWatchState::Watching);
        self.ctx.emit(&event);
        ReindexOutcome::Indexed
    }

    fn fail(&self, path: &str, error: &Error) -> ReindexOutcome {
        let message = error.to_string();
        warn!(path, error = %message, "Reindex failed");
        self.set_state(
            path,
            FileWatchState::Error {
                message: message.clone(),
            },
        );
        self.ctx.emit(&ChangeEvent::index_error(path, &message));
        ReindexOutcome::Failed(message)
    }

    fn set_state(&self, path: &str, state: FileWatchState) {
        self.lock_states().insert(path.to_string(), state);
    }

    fn lock_states(&self) -> MutexGuard<'_, HashMap<String, FileWatchState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Watch subscription ───────────────────────────────────────

/// Cancellable stream of changed plan documents.
///
/// Dropping the subscription stops the underlying watcher.
pub struct WatchSubscription {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    guard: PathGuard,
    debounce: Duration,
    cancel: CancellationToken,
}

impl std::fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("debounce", &self.debounce)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Start watching the context's plan root.
///
/// # Errors
///
/// Returns `PLAN_ROOT_MISSING` or a watch backend error.
pub fn subscribe(ctx: &AppContext, cancel: CancellationToken) -> Result<WatchSubscription> {
    let plan_root = ctx.require_plan_root()?;
    let (tx, rx) = mpsc::unbounded_channel();

    let mut watcher = notify::recommended_watcher(move |res| {
        // Receiver gone means the subscription was dropped
        let _ = tx.send(res);
    })?;
    watcher.watch(&plan_root, RecursiveMode::Recursive)?;
    info!(root = %plan_root.display(), "Watching plan root");

    Ok(WatchSubscription {
        _watcher: watcher,
        rx,
        guard: ctx.guard().clone(),
        debounce: Duration::from_millis(ctx.config().debounce_ms),
        cancel,
    })
}

impl WatchSubscription {
    /// Wait for the next batch of changed documents.
    ///
    /// Collects paths until no new change arrives for the debounce period.
    /// Returns `None` once cancelled or when the watcher shuts down.
    pub async fn next_batch(&mut self) -> Option<BTreeSet<String>> {
        let mut batch = BTreeSet::new();

        while batch.is_empty() {
            tokio::select! {
                () = self.cancel.cancelled() => return None,
                maybe = self.rx.recv() => absorb(&self.guard, maybe?, &mut batch),
            }
        }

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return None,
                () = tokio::time::sleep(self.debounce) => break,
                maybe = self.rx.recv() => match maybe {
                    Some(res) => absorb(&self.guard, res, &mut batch),
                    None => break,
                },
            }
        }

        debug!(paths = batch.len(), "Change batch ready");
        Some(batch)
    }
}

/// Add the plan documents touched by a watch event to `batch`.
fn absorb(guard: &PathGuard, res: notify::Result<notify::Event>, batch: &mut BTreeSet<String>) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Watch backend error");
            return;
        }
    };
    if matches!(event.kind, EventKind::Access(_)) {
        return;
    }
    for path in &event.paths {
        if !is_markdown(path) {
            continue;
        }
        if let Some(rel) = guard.relative(path)
            && !rel.split('/').any(|s| s.starts_with('.'))
        {
            batch.insert(rel);
        }
    }
}

/// Feed batches from `subscription` into `reindexer` until cancelled.
pub async fn run(reindexer: Arc<Reindexer>, mut subscription: WatchSubscription) {
    while let Some(batch) = subscription.next_batch().await {
        for path in &batch {
            reindexer.trigger(path);
        }
    }
    info!("Watch stopped");
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}
