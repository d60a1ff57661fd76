use std::sync::Arc;

use parking_lot::Mutex;
use query_sync::{LoadError, RaceResolver, Ticket};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::fields::{keyword_filter, FieldNames, OptionPayload, SelectOption};
use crate::source::ListSource;
use crate::OptionError;

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteState<T> {
    pub options: Vec<SelectOption<T>>,
    pub loading: bool,
    pub error: Option<LoadError>,
}

impl<T> Default for RemoteState<T> {
    fn default() -> Self {
        Self {
            options: Vec::new(),
            loading: false,
            error: None,
        }
    }
}

type FilterFn<T> = Arc<dyn Fn(&str, &SelectOption<T>) -> bool + Send + Sync>;

struct RemoteInner<T> {
    source: Mutex<Arc<dyn ListSource<T>>>,
    names: FieldNames<T>,
    filter: Option<FilterFn<T>>,
    resolver: RaceResolver,
    runtime: Handle,
    state: Mutex<RemoteState<T>>,
    published: watch::Sender<RemoteState<T>>,
}

impl<T> RemoteInner<T>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    fn load(self: &Arc<Self>) {
        let (ticket, state) = {
            let mut state = self.state.lock();
            let ticket = self.resolver.issue();
            state.loading = true;
            (ticket, state.clone())
        };
        self.published.send_replace(state);
        let source = Arc::clone(&*self.source.lock());
        let weak = Arc::downgrade(self);
        debug!(target = "remote_options.remote", ticket, "loading options");
        self.runtime.spawn(async move {
            let result = source.load().await;
            if let Some(inner) = weak.upgrade() {
                inner.settle(ticket, result);
            }
        });
    }

    fn settle(&self, ticket: Ticket, result: Result<OptionPayload<T>, LoadError>) {
        let options = result.and_then(|payload| {
            self.names
                .transform(&payload.into_items())
                .map_err(|err| LoadError::Decode(err.to_string()))
        });
        let state = {
            let mut state = self.state.lock();
            if !self.resolver.is_current(ticket) {
                trace!(target = "remote_options.remote", ticket, "discarding stale options");
                return;
            }
            match options {
                Ok(options) => {
                    state.options = options;
                    state.error = None;
                }
                Err(err) => {
                    warn!(target = "remote_options.remote", ticket, error = %err, "option load failed");
                    state.error = Some(err);
                }
            }
            state.loading = false;
            state.clone()
        };
        self.published.send_replace(state);
    }
}

/// Select over a list fetched once from a [`ListSource`], filtered locally.
pub struct RemoteSelect<T> {
    inner: Arc<RemoteInner<T>>,
}

pub struct RemoteSelectOptions<T> {
    source: Arc<dyn ListSource<T>>,
    names: FieldNames<T>,
    filter: Option<FilterFn<T>>,
    searchable: bool,
}

impl<T> RemoteSelectOptions<T>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    pub fn field_names(mut self, names: FieldNames<T>) -> Self {
        self.names = names;
        self
    }

    /// Local filtering with the keyword filter.
    pub fn searchable(mut self, searchable: bool) -> Self {
        self.searchable = searchable;
        self
    }

    /// Custom local filter; implies searchable.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str, &SelectOption<T>) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self.searchable = true;
        self
    }

    /// Starts the first load right away.
    pub fn build(self) -> Result<RemoteSelect<T>, OptionError> {
        let runtime = Handle::try_current().map_err(|_| OptionError::NoRuntime)?;
        let filter = match (self.filter, self.searchable) {
            (Some(filter), _) => Some(filter),
            (None, true) => Some(Arc::new(keyword_filter::<T>) as FilterFn<T>),
            (None, false) => None,
        };
        let (published, _) = watch::channel(RemoteState::default());
        let inner = Arc::new(RemoteInner {
            source: Mutex::new(self.source),
            names: self.names,
            filter,
            resolver: RaceResolver::new(),
            runtime,
            state: Mutex::new(RemoteState::default()),
            published,
        });
        inner.load();
        Ok(RemoteSelect { inner })
    }
}

impl<T> RemoteSelect<T>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    pub fn options<S>(source: S) -> RemoteSelectOptions<T>
    where
        S: ListSource<T> + 'static,
    {
        Self::with_shared_source(Arc::new(source))
    }

    /// Same as [`RemoteSelect::options`] for a source shared between
    /// selects, typically a [`crate::CachedOptionSource`].
    pub fn with_shared_source(source: Arc<dyn ListSource<T>>) -> RemoteSelectOptions<T> {
        RemoteSelectOptions {
            source,
            names: FieldNames::default(),
            filter: None,
            searchable: false,
        }
    }

    pub fn state(&self) -> RemoteState<T> {
        self.inner.state.lock().clone()
    }

    pub fn watch(&self) -> watch::Receiver<RemoteState<T>> {
        self.inner.published.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().loading
    }

    pub fn is_searchable(&self) -> bool {
        self.inner.filter.is_some()
    }

    pub fn all_options(&self) -> Vec<SelectOption<T>> {
        self.inner.state.lock().options.clone()
    }

    /// Options matching `input`; everything when the select is not
    /// searchable.
    pub fn filtered_options(&self, input: &str) -> Vec<SelectOption<T>> {
        let state = self.inner.state.lock();
        match &self.inner.filter {
            Some(filter) => state
                .options
                .iter()
                .filter(|option| filter(input, option))
                .cloned()
                .collect(),
            None => state.options.clone(),
        }
    }

    /// Selected values are only shown once options exist to label them.
    pub fn displayed_value(&self, selected: &[Value]) -> Vec<Value> {
        if self.inner.state.lock().options.is_empty() {
            Vec::new()
        } else {
            selected.to_vec()
        }
    }

    /// Source items behind the selected values, in selection order.
    pub fn change(&self, selected: &[Value]) -> Vec<T> {
        let state = self.inner.state.lock();
        selected
            .iter()
            .filter_map(|value| {
                state
                    .options
                    .iter()
                    .find(|option| &option.value == value)
                    .map(|option| option.source.clone())
            })
            .collect()
    }

    pub fn reload(&self) {
        self.inner.load();
    }

    /// Opening an empty, idle select retries the load.
    pub fn on_dropdown_visible_change(&self, visible: bool) {
        let retry = {
            let state = self.inner.state.lock();
            visible && !state.loading && state.options.is_empty()
        };
        if retry {
            self.inner.load();
        }
    }

    /// A new source reloads; results of the previous source are dropped.
    pub fn set_source(&self, source: Arc<dyn ListSource<T>>) {
        *self.inner.source.lock() = source;
        self.inner.load();
    }

    pub async fn until_idle(&self) -> RemoteState<T> {
        let mut rx = self.watch();
        let settled = match rx.wait_for(|state| !state.loading).await {
            Ok(state) => Some(state.clone()),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| self.state())
    }
}

impl<T> std::fmt::Debug for RemoteSelect<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSelect")
            .field("names", &self.inner.names)
            .field("searchable", &self.inner.filter.is_some())
            .finish()
    }
}
