use std::sync::Arc;

use tokio::sync::watch;

use crate::identity::NavigationIdentity;
use crate::tracker::{NavigationTracker, Subscription};

/// Keeps the most recently observed [`NavigationIdentity`] for one consumer.
///
/// The subscription is registered before the initial value is read from the
/// tracker, so no event can slip between activation and the first read.
pub struct NavigationObserver {
    current: Arc<watch::Sender<NavigationIdentity>>,
    subscription: Option<Subscription>,
}

impl NavigationObserver {
    pub fn activate(tracker: &NavigationTracker) -> Self {
        Self::with_listener(tracker, |_| {})
    }

    /// `on_change` runs synchronously after every observed event, once the
    /// current identity has been updated.
    pub fn with_listener<F>(tracker: &NavigationTracker, on_change: F) -> Self
    where
        F: Fn(&NavigationIdentity) + Send + Sync + 'static,
    {
        let (sender, _) = watch::channel(NavigationIdentity::unknown());
        let current = Arc::new(sender);
        let sink = Arc::clone(&current);
        let subscription = tracker.subscribe(move |event| {
            let identity = event.identity();
            sink.send_replace(identity.clone());
            on_change(&identity);
        });
        current.send_replace(tracker.current());
        Self {
            current,
            subscription: Some(subscription),
        }
    }

    pub fn current(&self) -> NavigationIdentity {
        self.current.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<NavigationIdentity> {
        self.current.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    /// Stops following the tracker; `current` keeps the last observed value.
    pub fn deactivate(&mut self) {
        self.subscription.take();
    }
}

impl std::fmt::Debug for NavigationObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationObserver")
            .field("current", &*self.current.borrow())
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryHistory;
    use parking_lot::Mutex;
    use serde_json::Value;

    fn tracker() -> Arc<NavigationTracker> {
        NavigationTracker::install(Arc::new(MemoryHistory::new("/")))
    }

    #[test]
    fn seeds_from_tracker_on_activation() {
        let tracker = tracker();
        let observer = NavigationObserver::activate(&tracker);
        assert_eq!(observer.current(), tracker.current());
        assert_eq!(observer.current().index, 0);
    }

    #[test]
    fn follows_push_replace_and_pop() {
        let tracker = tracker();
        let observer = NavigationObserver::activate(&tracker);
        let pushed = tracker.push(Value::Null, Some("/a"));
        assert_eq!(observer.current(), pushed);
        let replaced = tracker.replace(Value::Null, None);
        assert_eq!(observer.current(), replaced);
        let popped = tracker.back().unwrap().unwrap();
        assert_eq!(observer.current(), popped);
        assert_eq!(popped.index, 0);
    }

    #[test]
    fn listener_sees_updated_identity() {
        let tracker = tracker();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _observer = NavigationObserver::with_listener(&tracker, move |identity| {
            sink.lock().push(identity.index);
        });
        tracker.push(Value::Null, None);
        tracker.push(Value::Null, None);
        assert_eq!(seen.lock().as_slice(), [1, 2]);
    }

    #[test]
    fn deactivation_freezes_value() {
        let tracker = tracker();
        let mut observer = NavigationObserver::activate(&tracker);
        let pushed = tracker.push(Value::Null, None);
        observer.deactivate();
        tracker.push(Value::Null, None);
        assert!(!observer.is_active());
        assert_eq!(observer.current(), pushed);
        assert_eq!(tracker.listener_count(), 0);
    }

    #[tokio::test]
    async fn late_reader_gets_latest_identity() {
        let tracker = tracker();
        let observer = NavigationObserver::activate(&tracker);
        let mut rx = observer.watch();
        tracker.push(Value::Null, None);
        tracker.push(Value::Null, None);
        let last = tracker.push(Value::Null, None);
        rx.changed().await.expect("sender alive");
        assert_eq!(*rx.borrow_and_update(), last);
    }
}
