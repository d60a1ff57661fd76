use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::identity::{stamp, NavigationIdentity};
use crate::platform::{HistoryPlatform, Traversal};
use crate::{NavError, NavResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationEventKind {
    Pushed,
    Replaced,
    Popped,
}

/// Emitted after the platform history has been mutated; `state` is the full
/// data of the entry that is now current.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationEvent {
    pub kind: NavigationEventKind,
    pub state: Value,
}

impl NavigationEvent {
    pub fn identity(&self) -> NavigationIdentity {
        NavigationIdentity::from_state(&self.state).unwrap_or_default()
    }
}

type Listener = Arc<dyn Fn(&NavigationEvent) + Send + Sync>;
type ListenerMap = RwLock<BTreeMap<u64, Listener>>;

/// Registration handle returned by [`NavigationTracker::subscribe`]. The
/// listener is removed when the handle is dropped.
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerMap>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.write().remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Wraps a [`HistoryPlatform`] so every entry carries a [`NavigationIdentity`].
pub struct NavigationTracker {
    platform: Arc<dyn HistoryPlatform>,
    index: Mutex<i64>,
    listeners: Arc<ListenerMap>,
    next_listener: AtomicU64,
    pending: Mutex<VecDeque<NavigationEvent>>,
    delivering: AtomicBool,
    stream: broadcast::Sender<NavigationEvent>,
}

impl NavigationTracker {
    /// Takes over `platform`. An entry without identity is stamped with
    /// index 0 in place, without emitting, so later pushes have a baseline.
    pub fn install(platform: Arc<dyn HistoryPlatform>) -> Arc<Self> {
        let existing = NavigationIdentity::from_state(&platform.state()).filter(|id| id.is_known());
        let index = match existing {
            Some(identity) => identity.index,
            None => {
                let identity = NavigationIdentity::generate(0);
                platform.replace_state(stamp(platform.state(), &identity), None);
                debug!(target = "history.nav", key = %identity.key, "stamped initial entry");
                0
            }
        };
        let (stream, _) = broadcast::channel(64);
        Arc::new(Self {
            platform,
            index: Mutex::new(index),
            listeners: Arc::new(RwLock::new(BTreeMap::new())),
            next_listener: AtomicU64::new(1),
            pending: Mutex::new(VecDeque::new()),
            delivering: AtomicBool::new(false),
            stream,
        })
    }

    pub fn platform(&self) -> &Arc<dyn HistoryPlatform> {
        &self.platform
    }

    pub fn current(&self) -> NavigationIdentity {
        NavigationIdentity::from_state(&self.platform.state()).unwrap_or_default()
    }

    pub fn current_state(&self) -> Value {
        self.platform.state()
    }

    pub fn location(&self) -> String {
        self.platform.location()
    }

    pub fn push(&self, data: Value, url: Option<&str>) -> NavigationIdentity {
        let identity = {
            let mut index = self.index.lock();
            *index += 1;
            NavigationIdentity::generate(*index)
        };
        let state = stamp(data, &identity);
        self.platform.push_state(state.clone(), url);
        debug!(target = "history.nav", index = identity.index, key = %identity.key, "pushed entry");
        self.emit(NavigationEvent {
            kind: NavigationEventKind::Pushed,
            state,
        });
        identity
    }

    /// Replaces the current entry. The index is kept (same place in history)
    /// but a fresh key is stamped.
    pub fn replace(&self, data: Value, url: Option<&str>) -> NavigationIdentity {
        let identity = NavigationIdentity::generate(self.current().index);
        let state = stamp(data, &identity);
        self.platform.replace_state(state.clone(), url);
        debug!(target = "history.nav", index = identity.index, key = %identity.key, "replaced entry");
        self.emit(NavigationEvent {
            kind: NavigationEventKind::Replaced,
            state,
        });
        identity
    }

    /// Edits the current entry's data in place, keeping its identity verbatim.
    pub fn amend<F>(&self, mutator: F) -> NavigationIdentity
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let current = self.platform.state();
        let identity = NavigationIdentity::from_state(&current).unwrap_or_default();
        let mut map = match current {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        mutator(&mut map);
        let state = stamp(Value::Object(map), &identity);
        self.platform.replace_state(state.clone(), None);
        trace!(target = "history.nav", index = identity.index, "amended entry");
        self.emit(NavigationEvent {
            kind: NavigationEventKind::Replaced,
            state,
        });
        identity
    }

    /// Returns `Ok(None)` when the platform reports the pop asynchronously.
    pub fn go(&self, delta: i64) -> NavResult<Option<NavigationIdentity>> {
        match self.platform.go(delta) {
            Traversal::Landed(state) => Ok(Some(self.handle_pop(state))),
            Traversal::Deferred => Ok(None),
            Traversal::OutOfRange => Err(NavError::OutOfRange { delta }),
        }
    }

    pub fn back(&self) -> NavResult<Option<NavigationIdentity>> {
        self.go(-1)
    }

    pub fn forward(&self) -> NavResult<Option<NavigationIdentity>> {
        self.go(1)
    }

    /// Entry point for platform-reported pops. The counter resumes from the
    /// popped entry so the next push lands right after it.
    pub fn handle_pop(&self, state: Value) -> NavigationIdentity {
        let identity = NavigationIdentity::from_state(&state).unwrap_or_default();
        *self.index.lock() = identity.index;
        debug!(target = "history.nav", index = identity.index, key = %identity.key, "popped entry");
        self.emit(NavigationEvent {
            kind: NavigationEventKind::Popped,
            state,
        });
        identity
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&NavigationEvent) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().insert(id, Arc::new(listener));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Async view of the same events, for consumers that poll.
    pub fn events(&self) -> broadcast::Receiver<NavigationEvent> {
        self.stream.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    // Listeners may navigate from inside a callback; those events queue up
    // and are delivered after the current one so every listener sees the same
    // order.
    fn emit(&self, event: NavigationEvent) {
        let _ = self.stream.send(event.clone());
        self.pending.lock().push_back(event);
        loop {
            if self.delivering.swap(true, Ordering::AcqRel) {
                return;
            }
            let guard = Delivering(&self.delivering);
            while let Some(next) = self.pop_pending() {
                let listeners: Vec<Listener> = self.listeners.read().values().cloned().collect();
                for listener in listeners {
                    listener(&next);
                }
            }
            drop(guard);
            if self.pending.lock().is_empty() {
                return;
            }
        }
    }

    fn pop_pending(&self) -> Option<NavigationEvent> {
        self.pending.lock().pop_front()
    }
}

/// Clears the delivery flag on scope exit, unwinding included.
struct Delivering<'a>(&'a AtomicBool);

impl Drop for Delivering<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryHistory;
    use serde_json::json;

    fn tracker() -> (Arc<MemoryHistory>, Arc<NavigationTracker>) {
        let history = Arc::new(MemoryHistory::new("/"));
        let tracker = NavigationTracker::install(history.clone());
        (history, tracker)
    }

    fn recorder(tracker: &NavigationTracker) -> (Arc<Mutex<Vec<NavigationEvent>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = tracker.subscribe(move |event| sink.lock().push(event.clone()));
        (seen, sub)
    }

    #[test]
    fn install_stamps_baseline_without_emitting() {
        let history = Arc::new(MemoryHistory::with_state("/", json!({ "keep": 1 })));
        let tracker = NavigationTracker::install(history.clone());
        let current = tracker.current();
        assert_eq!(current.index, 0);
        assert!(!current.key.is_empty());
        assert_eq!(history.state()["keep"], 1);
    }

    #[test]
    fn install_resumes_existing_identity() {
        let history = Arc::new(MemoryHistory::with_state(
            "/",
            json!({ "navigation": { "key": "abc", "index": 7 } }),
        ));
        let tracker = NavigationTracker::install(history);
        tracker.push(Value::Null, Some("/next"));
        assert_eq!(tracker.current().index, 8);
    }

    #[test]
    fn push_increments_index_and_emits_after_mutation() {
        let (history, tracker) = tracker();
        let observed = Arc::new(Mutex::new(None));
        let sink = observed.clone();
        let probe = history.clone();
        let _sub = tracker.subscribe(move |_| *sink.lock() = Some(probe.location()));

        let first = tracker.push(json!({ "a": 1 }), Some("/orders"));
        let second = tracker.push(Value::Null, Some("/orders/1"));
        assert_eq!(first.index, 1);
        assert_eq!(second.index, 2);
        assert_ne!(first.key, second.key);
        assert_eq!(observed.lock().as_deref(), Some("/orders/1"));
    }

    #[test]
    fn replace_keeps_index_but_rekeys() {
        let (_history, tracker) = tracker();
        let pushed = tracker.push(Value::Null, Some("/a"));
        let (seen, _sub) = recorder(&tracker);
        let replaced = tracker.replace(json!({ "x": 1 }), None);
        assert_eq!(replaced.index, pushed.index);
        assert_ne!(replaced.key, pushed.key);
        let events = seen.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, NavigationEventKind::Replaced);
        assert_eq!(events[0].state["x"], 1);
    }

    #[test]
    fn amend_keeps_identity() {
        let (_history, tracker) = tracker();
        let pushed = tracker.push(json!({ "form": { "search": "x" } }), None);
        let amended = tracker.amend(|state| {
            state.insert("table".into(), json!({ "orders": {} }));
        });
        assert_eq!(amended, pushed);
        let state = tracker.current_state();
        assert_eq!(state["form"]["search"], "x");
        assert!(state["table"]["orders"].is_object());
        assert_eq!(tracker.current(), pushed);
    }

    #[test]
    fn pop_restores_identity_verbatim_and_resumes_counter() {
        let (_history, tracker) = tracker();
        let first = tracker.push(Value::Null, Some("/a"));
        let _second = tracker.push(Value::Null, Some("/b"));
        let (seen, _sub) = recorder(&tracker);

        let popped = tracker.back().expect("in range").expect("synchronous");
        assert_eq!(popped, first);
        assert_eq!(seen.lock()[0].kind, NavigationEventKind::Popped);

        let third = tracker.push(Value::Null, Some("/c"));
        assert_eq!(third.index, first.index + 1);
        assert!(tracker.forward().is_err());
    }

    #[test]
    fn nested_emissions_are_delivered_in_order() {
        let (_history, tracker) = tracker();
        let order = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&tracker);
        let first_sink = order.clone();
        let _first = tracker.subscribe(move |event| {
            first_sink.lock().push(("first", event.kind));
            if event.kind == NavigationEventKind::Pushed {
                if let Some(tracker) = weak.upgrade() {
                    tracker.amend(|_| {});
                }
            }
        });
        let second_sink = order.clone();
        let _second = tracker.subscribe(move |event| second_sink.lock().push(("second", event.kind)));

        tracker.push(Value::Null, None);
        assert_eq!(
            order.lock().as_slice(),
            [
                ("first", NavigationEventKind::Pushed),
                ("second", NavigationEventKind::Pushed),
                ("first", NavigationEventKind::Replaced),
                ("second", NavigationEventKind::Replaced),
            ]
        );
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let (_history, tracker) = tracker();
        let (seen, sub) = recorder(&tracker);
        tracker.push(Value::Null, None);
        drop(sub);
        tracker.push(Value::Null, None);
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(tracker.listener_count(), 0);
    }

    #[test]
    fn a_panicking_listener_does_not_stall_delivery() {
        let (_history, tracker) = tracker();
        let (seen, _sub) = recorder(&tracker);
        let tripped = AtomicBool::new(false);
        let _failing = tracker.subscribe(move |_| {
            if !tripped.swap(true, Ordering::SeqCst) {
                panic!("listener failed");
            }
        });

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tracker.push(Value::Null, Some("/first"));
        }));
        assert!(outcome.is_err());

        let second = tracker.push(Value::Null, Some("/second"));
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].identity(), second);
    }

    #[tokio::test]
    async fn event_stream_mirrors_listeners() {
        let (_history, tracker) = tracker();
        let mut rx = tracker.events();
        let pushed = tracker.push(Value::Null, Some("/stream"));
        let event = rx.recv().await.expect("event");
        assert_eq!(event.kind, NavigationEventKind::Pushed);
        assert_eq!(event.identity(), pushed);
    }
}
