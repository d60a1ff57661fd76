use parking_lot::Mutex;
use serde_json::Value;

/// Outcome of asking the platform to move through history.
#[derive(Debug, Clone, PartialEq)]
pub enum Traversal {
    /// The platform moved synchronously and returned the landed entry's data.
    Landed(Value),
    /// The platform will report the pop later; forward it through
    /// [`crate::NavigationTracker::handle_pop`].
    Deferred,
    OutOfRange,
}

/// The primitive session-history operations the tracker wraps.
pub trait HistoryPlatform: Send + Sync {
    /// Data associated with the current entry (`Value::Null` when unset).
    fn state(&self) -> Value;

    fn push_state(&self, state: Value, url: Option<&str>);

    fn replace_state(&self, state: Value, url: Option<&str>);

    fn go(&self, delta: i64) -> Traversal;

    fn location(&self) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub url: String,
    pub state: Value,
}

/// In-process session history with browser push/replace/traverse semantics.
#[derive(Debug)]
pub struct MemoryHistory {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug)]
struct MemoryInner {
    entries: Vec<HistoryEntry>,
    cursor: usize,
}

impl MemoryHistory {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_state(url, Value::Null)
    }

    pub fn with_state(url: impl Into<String>, state: Value) -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                entries: vec![HistoryEntry {
                    url: url.into(),
                    state,
                }],
                cursor: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.inner.lock().cursor
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.inner.lock().entries.clone()
    }
}

impl HistoryPlatform for MemoryHistory {
    fn state(&self) -> Value {
        let inner = self.inner.lock();
        inner.entries[inner.cursor].state.clone()
    }

    fn push_state(&self, state: Value, url: Option<&str>) {
        let mut inner = self.inner.lock();
        let url = url
            .map(str::to_string)
            .unwrap_or_else(|| inner.entries[inner.cursor].url.clone());
        let keep = inner.cursor + 1;
        inner.entries.truncate(keep);
        inner.entries.push(HistoryEntry { url, state });
        inner.cursor = keep;
    }

    fn replace_state(&self, state: Value, url: Option<&str>) {
        let mut inner = self.inner.lock();
        let cursor = inner.cursor;
        let entry = &mut inner.entries[cursor];
        entry.state = state;
        if let Some(url) = url {
            entry.url = url.to_string();
        }
    }

    fn go(&self, delta: i64) -> Traversal {
        let mut inner = self.inner.lock();
        let target = inner.cursor as i64 + delta;
        if target < 0 || target >= inner.entries.len() as i64 {
            return Traversal::OutOfRange;
        }
        inner.cursor = target as usize;
        Traversal::Landed(inner.entries[inner.cursor].state.clone())
    }

    fn location(&self) -> String {
        let inner = self.inner.lock();
        inner.entries[inner.cursor].url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_truncates_forward_entries() {
        let history = MemoryHistory::new("/");
        history.push_state(json!({ "n": 1 }), Some("/a"));
        history.push_state(json!({ "n": 2 }), Some("/b"));
        assert_eq!(history.go(-2), Traversal::Landed(Value::Null));
        history.push_state(json!({ "n": 3 }), Some("/c"));
        let urls: Vec<_> = history.entries().into_iter().map(|e| e.url).collect();
        assert_eq!(urls, ["/", "/c"]);
        assert_eq!(history.cursor(), 1);
    }

    #[test]
    fn replace_keeps_url_unless_given() {
        let history = MemoryHistory::new("/orders");
        history.replace_state(json!({ "x": true }), None);
        assert_eq!(history.location(), "/orders");
        assert_eq!(history.state(), json!({ "x": true }));
    }

    #[test]
    fn traversal_out_of_range() {
        let history = MemoryHistory::new("/");
        assert_eq!(history.go(1), Traversal::OutOfRange);
        assert_eq!(history.go(-1), Traversal::OutOfRange);
        assert_eq!(history.cursor(), 0);
    }
}
