use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use history_nav::{NavigationIdentity, NavigationObserver, NavigationTracker};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::bridge::HistoryBridge;
use crate::codec::{FieldMap, FieldValue, TaggedCodec, ValueCodec};
use crate::error::CodecError;

/// The host's form instance.
pub trait FormFields: Send + Sync {
    /// `None` when the form has no values to offer (e.g. not mounted).
    fn fields(&self) -> Option<FieldMap>;
    /// Merges `values` into the current fields.
    fn set_fields(&self, values: FieldMap);
    fn reset_fields(&self);
    fn submit(&self);
}

type SubmitFn = Arc<dyn Fn(&FieldMap) + Send + Sync>;

/// In-process form holding its fields in a map.
pub struct MemoryForm {
    initial: FieldMap,
    values: Mutex<FieldMap>,
    mounted: AtomicBool,
    submissions: AtomicU64,
    on_submit: Option<SubmitFn>,
}

impl MemoryForm {
    pub fn new(initial: FieldMap) -> Self {
        Self {
            values: Mutex::new(initial.clone()),
            initial,
            mounted: AtomicBool::new(true),
            submissions: AtomicU64::new(0),
            on_submit: None,
        }
    }

    pub fn on_submit<F>(mut self, on_submit: F) -> Self
    where
        F: Fn(&FieldMap) + Send + Sync + 'static,
    {
        self.on_submit = Some(Arc::new(on_submit));
        self
    }

    pub fn values(&self) -> FieldMap {
        self.values.lock().clone()
    }

    pub fn get(&self, field: &str) -> Option<FieldValue> {
        self.values.lock().get(field).cloned()
    }

    pub fn set(&self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.values.lock().insert(field.into(), value.into());
    }

    /// An unmounted form reports no values.
    pub fn set_mounted(&self, mounted: bool) {
        self.mounted.store(mounted, Ordering::Release);
    }

    pub fn submit_count(&self) -> u64 {
        self.submissions.load(Ordering::Acquire)
    }
}

impl Default for MemoryForm {
    fn default() -> Self {
        Self::new(FieldMap::new())
    }
}

impl FormFields for MemoryForm {
    fn fields(&self) -> Option<FieldMap> {
        self.mounted
            .load(Ordering::Acquire)
            .then(|| self.values())
    }

    fn set_fields(&self, values: FieldMap) {
        self.values.lock().extend(values);
    }

    fn reset_fields(&self) {
        *self.values.lock() = self.initial.clone();
    }

    fn submit(&self) {
        self.submissions.fetch_add(1, Ordering::AcqRel);
        if let Some(on_submit) = &self.on_submit {
            let values = self.values();
            on_submit(&values);
        }
    }
}

type FormExtrasFn = Arc<dyn Fn() -> FieldMap + Send + Sync>;

pub struct QueryFormOptions {
    name: String,
    form: Option<Arc<dyn FormFields>>,
    extras: Option<FormExtrasFn>,
    codec: Arc<dyn ValueCodec>,
}

impl QueryFormOptions {
    pub fn new() -> Self {
        Self {
            name: "default".to_string(),
            form: None,
            extras: None,
            codec: Arc::new(TaggedCodec::new()),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Without one, the view keeps its fields in an empty [`MemoryForm`]
    /// until [`QueryForm::set_form`] supplies the host's instance.
    pub fn form(mut self, form: Arc<dyn FormFields>) -> Self {
        self.form = Some(form);
        self
    }

    /// Values applied after a reset when the entry has nothing saved.
    pub fn extras<F>(mut self, extras: F) -> Self
    where
        F: Fn() -> FieldMap + Send + Sync + 'static,
    {
        self.extras = Some(Arc::new(extras));
        self
    }

    pub fn codec(mut self, codec: Arc<dyn ValueCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn build(self, tracker: &Arc<NavigationTracker>) -> QueryForm {
        let inner = Arc::new(FormInner {
            name: self.name,
            form: Mutex::new(
                self.form
                    .unwrap_or_else(|| Arc::new(MemoryForm::default()) as Arc<dyn FormFields>),
            ),
            extras: self.extras,
            codec: self.codec,
            bridge: HistoryBridge::new(Arc::clone(tracker)),
            last_seen: Mutex::new(None),
        });
        let weak = Arc::downgrade(&inner);
        let observer = NavigationObserver::with_listener(tracker, move |identity| {
            if let Some(inner) = weak.upgrade() {
                inner.on_navigate(identity);
            }
        });
        inner.on_navigate(&observer.current());
        QueryForm { inner, observer }
    }
}

impl Default for QueryFormOptions {
    fn default() -> Self {
        Self::new()
    }
}

struct FormInner {
    name: String,
    form: Mutex<Arc<dyn FormFields>>,
    extras: Option<FormExtrasFn>,
    codec: Arc<dyn ValueCodec>,
    bridge: HistoryBridge,
    last_seen: Mutex<Option<NavigationIdentity>>,
}

impl FormInner {
    fn current_form(&self) -> Arc<dyn FormFields> {
        self.form.lock().clone()
    }

    fn on_navigate(&self, identity: &NavigationIdentity) {
        let form = self.current_form();
        {
            let mut seen = self.last_seen.lock();
            if seen.as_ref() == Some(identity) {
                return;
            }
            *seen = Some(identity.clone());
        }
        form.reset_fields();
        let restored = self
            .bridge
            .restore_form(&self.name)
            .map(|text| self.codec.parse(&text));
        match restored {
            Some(Ok(values)) => {
                debug!(target = "query_sync.form", view = %self.name, index = identity.index, "restoring saved fields");
                form.set_fields(values);
            }
            Some(Err(err)) => {
                warn!(target = "query_sync.form", view = %self.name, error = %err, "ignoring unreadable saved fields");
                self.apply_extras(form.as_ref());
            }
            None => self.apply_extras(form.as_ref()),
        }
    }

    fn apply_extras(&self, form: &dyn FormFields) {
        if let Some(extras) = &self.extras {
            form.set_fields(extras());
        }
    }

    fn persist(&self) -> Result<(), CodecError> {
        let serialized = self
            .current_form()
            .fields()
            .map(|values| self.codec.stringify(&values))
            .transpose()?;
        self.bridge.persist_form(&self.name, serialized);
        Ok(())
    }
}

/// Keeps a form's field values in the current history entry.
///
/// Values are written on submit and reset, and read back whenever the
/// history entry changes.
pub struct QueryForm {
    inner: Arc<FormInner>,
    observer: NavigationObserver,
}

impl QueryForm {
    pub fn options() -> QueryFormOptions {
        QueryFormOptions::new()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn identity(&self) -> NavigationIdentity {
        self.observer.current()
    }

    pub fn form(&self) -> Arc<dyn FormFields> {
        self.inner.current_form()
    }

    pub fn values(&self) -> Option<FieldMap> {
        self.form().fields()
    }

    /// A different instance is initialized for the current entry.
    pub fn set_form(&self, form: Arc<dyn FormFields>) {
        let replaced = {
            let mut slot = self.inner.form.lock();
            let same = Arc::as_ptr(&*slot).cast::<()>() == Arc::as_ptr(&form).cast::<()>();
            *slot = form;
            !same
        };
        if replaced {
            *self.inner.last_seen.lock() = None;
            self.inner.on_navigate(&self.observer.current());
        }
    }

    /// Writes the current values into the history entry; a form without
    /// values clears the entry's key.
    pub fn persist(&self) -> Result<(), CodecError> {
        self.inner.persist()
    }

    pub fn submit(&self) {
        if let Err(err) = self.inner.persist() {
            warn!(target = "query_sync.form", view = %self.inner.name, error = %err, "submitting without saving fields");
        }
        self.form().submit();
    }

    pub fn reset_fields(&self) {
        self.form().reset_fields();
        if let Err(err) = self.inner.persist() {
            warn!(target = "query_sync.form", view = %self.inner.name, error = %err, "fields reset but not saved");
        }
    }
}

impl std::fmt::Debug for QueryForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryForm")
            .field("name", &self.inner.name)
            .field("identity", &self.observer.current())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use history_nav::MemoryHistory;
    use serde_json::Value;
    use time::macros::date;

    fn tracker() -> Arc<NavigationTracker> {
        NavigationTracker::install(Arc::new(MemoryHistory::new("/")))
    }

    fn initial() -> FieldMap {
        let mut values = FieldMap::new();
        values.insert("q".into(), "".into());
        values
    }

    #[test]
    fn submit_saves_and_back_restores() {
        let tracker = tracker();
        let form = Arc::new(MemoryForm::new(initial()));
        let query = QueryForm::options()
            .name("search")
            .form(form.clone())
            .build(&tracker);

        form.set("q", "rust");
        form.set("since", date!(2024-01-02));
        query.submit();
        assert_eq!(form.submit_count(), 1);

        tracker.push(Value::Null, Some("/next"));
        assert_eq!(form.get("q"), Some("".into()));
        assert_eq!(form.get("since"), None);

        tracker.back().unwrap();
        assert_eq!(form.get("q"), Some("rust".into()));
        assert_eq!(form.get("since"), Some(date!(2024-01-02).into()));
    }

    #[test]
    fn extras_apply_only_without_saved_values() {
        let tracker = tracker();
        let form = Arc::new(MemoryForm::new(initial()));
        let query = QueryForm::options()
            .form(form.clone())
            .extras(|| {
                let mut values = FieldMap::new();
                values.insert("q".into(), "preset".into());
                values
            })
            .build(&tracker);
        assert_eq!(form.get("q"), Some("preset".into()));

        form.set("q", "typed");
        query.submit();
        tracker.push(Value::Null, None);
        assert_eq!(form.get("q"), Some("preset".into()));
        tracker.back().unwrap();
        assert_eq!(form.get("q"), Some("typed".into()));
    }

    #[test]
    fn reset_saves_the_reset_values() {
        let tracker = tracker();
        let form = Arc::new(MemoryForm::new(initial()));
        let query = QueryForm::options().form(form.clone()).build(&tracker);
        form.set("q", "draft");
        query.submit();
        form.set("q", "changed");
        query.reset_fields();
        assert_eq!(form.get("q"), Some("".into()));
        assert_eq!(
            tracker.current_state()["form"]["default"],
            Value::String(r#"{"q":""}"#.into())
        );
    }

    #[test]
    fn form_without_values_clears_its_key() {
        let tracker = tracker();
        let form = Arc::new(MemoryForm::new(initial()));
        let query = QueryForm::options().form(form.clone()).build(&tracker);
        query.submit();
        assert!(tracker.current_state()["form"].get("default").is_some());
        form.set_mounted(false);
        query.persist().unwrap();
        assert!(tracker.current_state()["form"].get("default").is_none());
    }

    #[test]
    fn unreadable_saved_values_fall_back_to_initial() {
        let tracker = tracker();
        tracker.amend(|state| {
            state.insert("form".into(), serde_json::json!({"default": "{broken"}));
        });
        let form = Arc::new(MemoryForm::new(initial()));
        form.set("q", "stale");
        let _query = QueryForm::options().form(form.clone()).build(&tracker);
        assert_eq!(form.get("q"), Some("".into()));
    }

    #[test]
    fn late_form_instance_is_initialized() {
        let tracker = tracker();
        let first = Arc::new(MemoryForm::new(initial()));
        let query = QueryForm::options().build(&tracker);
        assert_eq!(query.values(), Some(FieldMap::new()));

        query.set_form(first.clone());
        first.set("q", "kept");
        query.submit();

        let second = Arc::new(MemoryForm::new(initial()));
        query.set_form(second.clone());
        assert_eq!(second.get("q"), Some("kept".into()));
    }

    #[test]
    fn without_a_form_fields_are_kept_in_memory() {
        let tracker = tracker();
        let query = QueryForm::options().name("search").build(&tracker);
        query.form().set_fields({
            let mut values = FieldMap::new();
            values.insert("q".into(), "rust".into());
            values
        });
        query.submit();
        assert_eq!(
            tracker.current_state()["form"]["search"],
            Value::String(r#"{"q":"rust"}"#.into())
        );

        tracker.push(Value::Null, Some("/next"));
        assert_eq!(query.values(), Some(FieldMap::new()));

        tracker.back().unwrap();
        let restored = query.values().unwrap_or_default();
        assert_eq!(restored.get("q"), Some(&"rust".into()));
    }
}
