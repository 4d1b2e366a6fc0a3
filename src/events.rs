//! Change events: the in-process bus and the subscriber fan-out.
//!
//! The [`EventBus`] is owned by the [`crate::context::AppContext`]; every
//! component that changes state emits through it. Handlers run
//! synchronously, in registration order, on the emitting thread.
//!
//! The [`Notifier`] is the outermost broadcast boundary. It serializes each
//! event once and hands the JSON line to every realtime subscriber. Each
//! subscriber gets a bounded queue. A subscriber whose receiving end is gone,
//! or whose queue is full, is dropped without affecting delivery to the rest.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam::channel::{Receiver, Sender, TrySendError};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::model::IndexedFile;
use crate::store::Record;

/// Event types carried on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "index:updated")]
    IndexUpdated,
    #[serde(rename = "index:error")]
    IndexError,
    #[serde(rename = "annotation:changed")]
    AnnotationChanged,
    #[serde(rename = "cycle:changed")]
    CycleChanged,
    #[serde(rename = "bundle:changed")]
    BundleChanged,
    #[serde(rename = "revision:changed")]
    RevisionChanged,
}

impl EventType {
    /// Wire name of the event type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IndexUpdated => "index:updated",
            Self::IndexError => "index:error",
            Self::AnnotationChanged => "annotation:changed",
            Self::CycleChanged => "cycle:changed",
            Self::BundleChanged => "bundle:changed",
            Self::RevisionChanged => "revision:changed",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{type, payload}` as sent to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Value,
}

impl ChangeEvent {
    #[must_use]
    pub fn new(event_type: EventType, payload: Value) -> Self {
        Self {
            event_type,
            payload,
        }
    }

    /// A document was (re)indexed.
    #[must_use]
    pub fn index_updated(file: &IndexedFile) -> Self {
        Self::new(
            EventType::IndexUpdated,
            json!({
                "path": file.path,
                "fileId": file.file_id,
                "sha256": file.sha256,
                "headingCount": file.headings.len(),
            }),
        )
    }

    /// A document disappeared and its catalog entry was dropped.
    #[must_use]
    pub fn index_removed(path: &str) -> Self {
        Self::new(
            EventType::IndexUpdated,
            json!({ "path": path, "removed": true }),
        )
    }

    /// A reindex pass failed; the previous catalog entry is still in place.
    #[must_use]
    pub fn index_error(path: &str, message: &str) -> Self {
        Self::new(
            EventType::IndexError,
            json!({ "path": path, "message": message }),
        )
    }

    /// A record was created or updated. `None` for kinds without an event.
    #[must_use]
    pub fn record_changed<R: Record>(record: &R) -> Option<Self> {
        let event_type = R::KIND.change_event()?;
        let value = serde_json::to_value(record).unwrap_or(Value::Null);
        Some(Self::new(
            event_type,
            json!({ "id": record.meta().id, "record": value }),
        ))
    }
}

type Handler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Synchronous publish/subscribe bus.
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<Vec<(SubscriptionId, Handler)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Handlers run in registration order.
    pub fn subscribe(&self, handler: impl Fn(&ChangeEvent) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.lock();
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != id);
        handlers.len() != before
    }

    /// Deliver `event` to every registered handler.
    ///
    /// The handler list is snapshotted first, so a handler may subscribe or
    /// unsubscribe without deadlocking. Handler panics propagate.
    pub fn emit(&self, event: &ChangeEvent) {
        let handlers: Vec<Handler> = self.lock().iter().map(|(_, h)| Arc::clone(h)).collect();
        debug!(event = %event.event_type, handlers = handlers.len(), "Emitting event");
        for handler in handlers {
            handler(event);
        }
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop every handler.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Handler)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Events a subscriber may have queued before it counts as lagging.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 1024;

/// Fan-out of serialized events to realtime subscribers.
#[derive(Debug, Default)]
pub struct Notifier {
    subscribers: Mutex<Vec<Sender<String>>>,
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a subscriber channel. Each message is one JSON-encoded event.
    pub fn subscribe(&self) -> Receiver<String> {
        self.subscribe_with_capacity(SUBSCRIBER_QUEUE_CAPACITY)
    }

    /// Open a subscriber channel holding at most `capacity` unread events.
    ///
    /// A subscriber that falls `capacity` events behind is disconnected.
    pub fn subscribe_with_capacity(&self, capacity: usize) -> Receiver<String> {
        let (tx, rx) = crossbeam::channel::bounded(capacity.max(1));
        self.lock().push(tx);
        rx
    }

    /// Forward every event emitted on `bus` to this notifier's subscribers.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> SubscriptionId {
        let notifier = Arc::clone(self);
        bus.subscribe(move |event| {
            notifier.broadcast(event);
        })
    }

    /// Send `event` to every live subscriber. Returns how many received it.
    pub fn broadcast(&self, event: &ChangeEvent) -> usize {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!(event = %event.event_type, error = %e, "Failed to serialize event");
                return 0;
            }
        };

        let mut subscribers = self.lock();
        let mut lagged = 0usize;
        let mut disconnected = 0usize;
        subscribers.retain(|tx| match tx.try_send(line.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                lagged += 1;
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                disconnected += 1;
                false
            }
        });

        if lagged > 0 {
            warn!(lagged, "Dropped subscribers that fell behind");
        }
        if disconnected > 0 {
            debug!(disconnected, "Dropped disconnected subscribers");
        }
        subscribers.len()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Close every subscriber channel.
    pub fn close(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Sender<String>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::index;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_event_json_shape() {
        let event = ChangeEvent::index_error("plan/a.md", "boom");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "index:error");
        assert_eq!(json["payload"]["path"], "plan/a.md");
        assert_eq!(json["payload"]["message"], "boom");

        let removed = serde_json::to_value(ChangeEvent::index_removed("plan/a.md")).unwrap();
        assert_eq!(removed["type"], "index:updated");
        assert_eq!(removed["payload"]["removed"], true);
    }

    #[test]
    fn test_index_updated_payload() {
        let file = index("# A\n", "plan/a.md");
        let event = ChangeEvent::index_updated(&file);
        assert_eq!(event.event_type, EventType::IndexUpdated);
        assert_eq!(event.payload["sha256"], file.sha256);
        assert_eq!(event.payload["headingCount"], 1);
    }

    #[test]
    fn test_bus_calls_handlers_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |_| seen.lock().unwrap().push(n));
        }
        bus.emit(&ChangeEvent::index_removed("x.md"));

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let id = bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&ChangeEvent::index_removed("x.md"));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&ChangeEvent::index_removed("x.md"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn test_handler_may_reenter_bus() {
        let bus = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        bus.subscribe(move |_| {
            inner.subscribe(|_| {});
        });
        bus.emit(&ChangeEvent::index_removed("x.md"));
        assert_eq!(bus.handler_count(), 2);
    }

    #[test]
    fn test_notifier_drops_dead_subscribers_and_keeps_delivering() {
        let notifier = Arc::new(Notifier::new());
        let bus = EventBus::new();
        notifier.attach(&bus);

        let alive = notifier.subscribe();
        let dead = notifier.subscribe();
        drop(dead);
        let also_alive = notifier.subscribe();

        bus.emit(&ChangeEvent::index_removed("plan/a.md"));

        assert_eq!(notifier.subscriber_count(), 2);
        let line = alive.try_recv().unwrap();
        let event: ChangeEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(event.event_type, EventType::IndexUpdated);
        assert_eq!(also_alive.try_recv().unwrap(), line);
    }

    #[test]
    fn test_notifier_close_disconnects_receivers() {
        let notifier = Notifier::new();
        let rx = notifier.subscribe();
        notifier.close();
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_notifier_drops_subscriber_that_falls_behind() {
        let notifier = Notifier::new();
        let idle = notifier.subscribe_with_capacity(4);
        let reader = notifier.subscribe_with_capacity(4);
        let event = ChangeEvent::index_removed("plan/a.md");

        for _ in 0..4 {
            assert_eq!(notifier.broadcast(&event), 2);
            reader.try_recv().unwrap();
        }
        // Fifth event overflows the idle queue only
        assert_eq!(notifier.broadcast(&event), 1);
        assert_eq!(notifier.subscriber_count(), 1);

        for _ in 0..100 {
            notifier.broadcast(&event);
            reader.try_recv().unwrap();
        }
        assert_eq!(idle.try_iter().count(), 4);
        assert!(idle.try_recv().is_err());
    }
}
