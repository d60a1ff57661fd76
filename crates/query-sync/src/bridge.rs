use std::sync::Arc;

use history_nav::{NavigationIdentity, NavigationTracker};
use serde_json::{Map, Value};
use tracing::warn;

use crate::table::TableSnapshot;

pub const TABLE_NAMESPACE: &str = "table";
pub const FORM_NAMESPACE: &str = "form";

/// Reads and writes per-view state inside the current history entry.
///
/// Entry layout: `{"table": {view: snapshot}, "form": {view: text}}`
/// next to the navigation identity. Writes go through
/// [`NavigationTracker::amend`], which keeps the entry's identity.
#[derive(Clone)]
pub struct HistoryBridge {
    tracker: Arc<NavigationTracker>,
}

impl HistoryBridge {
    pub fn new(tracker: Arc<NavigationTracker>) -> Self {
        Self { tracker }
    }

    pub fn tracker(&self) -> &Arc<NavigationTracker> {
        &self.tracker
    }

    /// `None` when absent or unreadable.
    pub fn restore_table(&self, view: &str) -> Option<TableSnapshot> {
        let raw = lookup(&self.tracker.current_state(), TABLE_NAMESPACE, view)?;
        match serde_json::from_value(raw) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(target = "query_sync.bridge", view, error = %err, "ignoring malformed table snapshot");
                None
            }
        }
    }

    pub fn persist_table(&self, view: &str, snapshot: &TableSnapshot) -> NavigationIdentity {
        let value = match serde_json::to_value(snapshot) {
            Ok(value) => value,
            Err(err) => {
                warn!(target = "query_sync.bridge", view, error = %err, "table snapshot not serializable");
                return self.tracker.current();
            }
        };
        self.tracker
            .amend(|state| write_view(state, TABLE_NAMESPACE, view, Some(value)))
    }

    pub fn restore_form(&self, view: &str) -> Option<String> {
        match lookup(&self.tracker.current_state(), FORM_NAMESPACE, view)? {
            Value::String(text) => Some(text),
            other => {
                warn!(target = "query_sync.bridge", view, found = %other, "ignoring non-text form entry");
                None
            }
        }
    }

    /// `None` removes the view's entry.
    pub fn persist_form(&self, view: &str, serialized: Option<String>) -> NavigationIdentity {
        self.tracker.amend(|state| {
            write_view(state, FORM_NAMESPACE, view, serialized.map(Value::String))
        })
    }
}

impl std::fmt::Debug for HistoryBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryBridge")
            .field("current", &self.tracker.current())
            .finish()
    }
}

fn lookup(state: &Value, namespace: &str, view: &str) -> Option<Value> {
    state.get(namespace)?.get(view).cloned()
}

fn write_view(state: &mut Map<String, Value>, namespace: &str, view: &str, value: Option<Value>) {
    let slot = state
        .entry(namespace.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(views) = slot {
        match value {
            Some(value) => {
                views.insert(view.to_string(), value);
            }
            None => {
                views.remove(view);
            }
        }
    }
}
