use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use query_sync::{EngineConfig, LoadError, RaceResolver, Ticket};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::fields::{FieldNames, OptionPayload, SelectOption};
use crate::source::SearchSource;
use crate::OptionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSettings {
    /// Opening with no selection searches for `""`; an empty keyword
    /// otherwise yields no results without querying.
    pub allow_empty_search: bool,
    pub allow_clear: bool,
    pub debounce: Duration,
}

impl SearchSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            allow_empty_search: true,
            allow_clear: true,
            debounce: config.search_debounce,
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchState<T> {
    /// Options outside a search session (usually just the selection).
    pub data: Vec<SelectOption<T>>,
    pub search_data: Vec<SelectOption<T>>,
    pub loading: bool,
    pub searching: bool,
    pub error: Option<LoadError>,
}

impl<T> SearchState<T> {
    pub fn options(&self) -> &[SelectOption<T>] {
        if self.searching {
            &self.search_data
        } else {
            &self.data
        }
    }

    fn close(&mut self) {
        self.search_data.clear();
        self.loading = false;
        self.searching = false;
    }
}

impl<T> Default for SearchState<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            search_data: Vec::new(),
            loading: false,
            searching: false,
            error: None,
        }
    }
}

struct SearchCore<T> {
    state: SearchState<T>,
    value: Option<T>,
}

struct SearchInner<T> {
    source: Arc<dyn SearchSource<T>>,
    names: FieldNames<T>,
    settings: SearchSettings,
    resolver: RaceResolver,
    runtime: Handle,
    core: Mutex<SearchCore<T>>,
    published: watch::Sender<SearchState<T>>,
}

impl<T> SearchInner<T>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    fn publish(&self, state: SearchState<T>) {
        self.published.send_replace(state);
    }

    /// Runs when the debounce window closes; `false` when the keystroke was
    /// superseded or nothing needs fetching.
    fn begin(&self, ticket: Ticket, term: &str) -> bool {
        let state = {
            let mut core = self.core.lock();
            if !self.resolver.is_current(ticket) || !core.state.searching {
                return false;
            }
            if !self.settings.allow_empty_search && term.is_empty() {
                core.state.search_data.clear();
                core.state.loading = false;
                let state = core.state.clone();
                drop(core);
                self.publish(state);
                return false;
            }
            core.state.loading = true;
            core.state.clone()
        };
        self.publish(state);
        true
    }

    fn finish(&self, ticket: Ticket, result: Result<OptionPayload<T>, LoadError>) {
        let options = result.and_then(|payload| {
            self.names
                .transform(&payload.into_items())
                .map_err(|err| LoadError::Decode(err.to_string()))
        });
        let state = {
            let mut core = self.core.lock();
            if !self.resolver.is_current(ticket) {
                trace!(target = "remote_options.search", ticket, "discarding stale search");
                return;
            }
            match options {
                Ok(options) => {
                    core.state.search_data = options;
                    core.state.error = None;
                }
                Err(err) => {
                    warn!(target = "remote_options.search", ticket, error = %err, "search failed");
                    core.state.error = Some(err);
                }
            }
            core.state.loading = false;
            core.state.clone()
        };
        self.publish(state);
    }
}

/// Select whose options come from a keyword search, debounced, with the
/// newest keystroke winning.
pub struct SearchSelect<T> {
    inner: Arc<SearchInner<T>>,
}

pub struct SearchSelectOptions<T> {
    source: Arc<dyn SearchSource<T>>,
    names: FieldNames<T>,
    settings: SearchSettings,
    value: Option<T>,
}

impl<T> SearchSelectOptions<T>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    pub fn field_names(mut self, names: FieldNames<T>) -> Self {
        self.names = names;
        self
    }

    pub fn settings(mut self, settings: SearchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Pre-selected item, shown as the only option until a search starts.
    pub fn value(mut self, value: T) -> Self {
        self.value = Some(value);
        self
    }

    pub fn build(self) -> Result<SearchSelect<T>, OptionError> {
        let runtime = Handle::try_current().map_err(|_| OptionError::NoRuntime)?;
        let data = match &self.value {
            Some(value) => self.names.transform(std::slice::from_ref(value))?,
            None => Vec::new(),
        };
        let state = SearchState {
            data,
            ..SearchState::default()
        };
        let (published, _) = watch::channel(state.clone());
        Ok(SearchSelect {
            inner: Arc::new(SearchInner {
                source: self.source,
                names: self.names,
                settings: self.settings,
                resolver: RaceResolver::new(),
                runtime,
                core: Mutex::new(SearchCore {
                    state,
                    value: self.value,
                }),
                published,
            }),
        })
    }
}

impl<T> SearchSelect<T>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    pub fn options<S>(source: S) -> SearchSelectOptions<T>
    where
        S: SearchSource<T> + 'static,
    {
        SearchSelectOptions {
            source: Arc::new(source),
            names: FieldNames::default(),
            settings: SearchSettings::default(),
            value: None,
        }
    }

    pub fn state(&self) -> SearchState<T> {
        self.inner.core.lock().state.clone()
    }

    pub fn watch(&self) -> watch::Receiver<SearchState<T>> {
        self.inner.published.subscribe()
    }

    /// Options currently offered: search results while searching, the
    /// retained selection otherwise.
    pub fn visible_options(&self) -> Vec<SelectOption<T>> {
        self.inner.core.lock().state.options().to_vec()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.core.lock().state.loading
    }

    pub fn is_searching(&self) -> bool {
        self.inner.core.lock().state.searching
    }

    /// The clear control is hidden during a search.
    pub fn allow_clear(&self) -> bool {
        !self.is_searching() && self.inner.settings.allow_clear
    }

    pub fn selected(&self) -> Option<T> {
        self.inner.core.lock().value.clone()
    }

    pub fn selected_value(&self) -> Option<Value> {
        let value = self.selected()?;
        self.inner.names.value_of(&value).ok()
    }

    /// Keystroke handler. Enters search mode at once; the source is queried
    /// once input has been quiet for the debounce window.
    pub fn search(&self, term: impl Into<String>) {
        let term = term.into();
        let (ticket, state) = {
            let mut core = self.inner.core.lock();
            core.state.searching = true;
            (self.inner.resolver.issue(), core.state.clone())
        };
        self.inner.publish(state);

        let weak = Arc::downgrade(&self.inner);
        let source = Arc::clone(&self.inner.source);
        let debounce = self.inner.settings.debounce;
        self.inner.runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            if !begin_search(&weak, ticket, &term) {
                return;
            }
            debug!(target = "remote_options.search", ticket, term = %term, "searching");
            let result = source.search(term).await;
            if let Some(inner) = weak.upgrade() {
                inner.finish(ticket, result);
            }
        });
    }

    pub fn on_dropdown_visible_change(&self, visible: bool) {
        if visible {
            let empty_search = {
                let core = self.inner.core.lock();
                core.value.is_none() && self.inner.settings.allow_empty_search
            };
            if empty_search {
                self.search("");
            }
        } else {
            let state = {
                let mut core = self.inner.core.lock();
                self.inner.resolver.invalidate();
                core.state.close();
                core.state.clone()
            };
            self.inner.publish(state);
        }
    }

    /// Selection handler. `None` clears. Returns the selected source item.
    pub fn change(&self, value: Option<&Value>) -> Option<T> {
        let (selected, state) = {
            let mut core = self.inner.core.lock();
            self.inner.resolver.invalidate();
            let selected = match value {
                Some(value) => {
                    let kept: Vec<SelectOption<T>> = core
                        .state
                        .options()
                        .iter()
                        .filter(|option| &option.value == value)
                        .cloned()
                        .collect();
                    let selected = kept.first().map(|option| option.source.clone());
                    core.state.data = kept;
                    selected
                }
                None => {
                    core.state.data.clear();
                    None
                }
            };
            core.state.close();
            core.value = selected.clone();
            (selected, core.state.clone())
        };
        self.inner.publish(state);
        selected
    }

    /// Host-side value change. An item missing from the retained options
    /// replaces them.
    pub fn set_value(&self, value: Option<T>) -> Result<(), OptionError> {
        let Some(item) = value else {
            self.inner.core.lock().value = None;
            return Ok(());
        };
        let key = self.inner.names.value_of(&item)?;
        let option = self.inner.names.option(&item)?;
        let state = {
            let mut core = self.inner.core.lock();
            core.value = Some(item);
            if core.state.data.iter().any(|existing| existing.value == key) {
                return Ok(());
            }
            core.state.data = vec![option];
            core.state.clone()
        };
        self.inner.publish(state);
        Ok(())
    }
}

fn begin_search<T>(weak: &Weak<SearchInner<T>>, ticket: Ticket, term: &str) -> bool
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    weak.upgrade()
        .is_some_and(|inner| inner.begin(ticket, term))
}

impl<T> std::fmt::Debug for SearchSelect<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchSelect")
            .field("names", &self.inner.names)
            .field("settings", &self.inner.settings)
            .finish()
    }
}
