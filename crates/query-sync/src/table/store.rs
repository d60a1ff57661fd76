use std::sync::Arc;

use history_nav::{NavigationIdentity, NavigationObserver, NavigationTracker};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::bridge::HistoryBridge;
use crate::config::EngineConfig;
use crate::error::{ConfigError, LoadError};
use crate::ticket::{RaceResolver, Ticket};

use super::change::TableChange;
use super::reducer::{reduce, TableAction};
use super::source::{Page, TableDataSource, TableRequest};
use super::state::{
    FilterValue, Filters, Pagination, PaginationPatch, QueryState, SortOrder, Sorters, TableUpdate,
};

/// Initial query supplied by the host when a history entry has no saved
/// snapshot. Fields left empty fall back to the view's defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableExtras {
    pub pagination: PaginationPatch,
    pub sorters: Option<Sorters>,
    pub filters: Option<Filters>,
}

type ExtrasFn = Arc<dyn Fn() -> TableExtras + Send + Sync>;

pub struct QueryTableOptions<T, P> {
    name: String,
    params: Option<P>,
    extras: Option<ExtrasFn>,
    default_pagination: PaginationPatch,
    default_sorters: Sorters,
    default_filters: Filters,
    source: Option<Arc<dyn TableDataSource<T, P>>>,
    manual_request: Option<bool>,
    config: EngineConfig,
}

impl<T, P> QueryTableOptions<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            name: "default".to_string(),
            params: None,
            extras: None,
            default_pagination: PaginationPatch::default(),
            default_sorters: Sorters::new(),
            default_filters: Filters::new(),
            source: None,
            manual_request: None,
            config: EngineConfig::default(),
        }
    }

    /// Key of this view inside the history entry; unique per page.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn params(mut self, params: P) -> Self {
        self.params = Some(params);
        self
    }

    pub fn extras<F>(mut self, extras: F) -> Self
    where
        F: Fn() -> TableExtras + Send + Sync + 'static,
    {
        self.extras = Some(Arc::new(extras));
        self
    }

    pub fn default_pagination(mut self, pagination: PaginationPatch) -> Self {
        self.default_pagination = pagination;
        self
    }

    pub fn default_sorters(mut self, sorters: Sorters) -> Self {
        self.default_sorters = sorters;
        self
    }

    pub fn default_filters(mut self, filters: Filters) -> Self {
        self.default_filters = filters;
        self
    }

    pub fn source<S>(mut self, source: S) -> Self
    where
        S: TableDataSource<T, P> + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn shared_source(mut self, source: Arc<dyn TableDataSource<T, P>>) -> Self {
        self.source = Some(source);
        self
    }

    /// Skip the automatic load on entry and reset; overrides the config.
    pub fn manual_request(mut self, manual: bool) -> Self {
        self.manual_request = Some(manual);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Mounts the view on `tracker`. Must run inside a tokio runtime, which
    /// is where loads are spawned.
    pub fn build(self, tracker: &Arc<NavigationTracker>) -> Result<QueryTable<T, P>, ConfigError> {
        let source = self.source.ok_or_else(|| ConfigError::MissingDataSource {
            view: self.name.clone(),
        })?;
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        let manual_request = self.manual_request.unwrap_or(self.config.manual_request);
        let defaults = TableDefaults {
            pagination: Pagination::new(self.config.default_page, self.config.default_page_size)
                .merge(self.default_pagination),
            sorters: self.default_sorters,
            filters: self.default_filters,
        };
        let initial = defaults.state();
        let (published, _) = watch::channel(initial.clone());

        let inner = Arc::new(TableInner {
            name: self.name,
            defaults,
            extras: self.extras,
            manual_request,
            params: Mutex::new(self.params),
            source,
            bridge: HistoryBridge::new(Arc::clone(tracker)),
            resolver: RaceResolver::new(),
            runtime,
            core: Mutex::new(TableCore {
                state: initial,
                last_seen: None,
            }),
            published,
        });

        let weak = Arc::downgrade(&inner);
        let observer = NavigationObserver::with_listener(tracker, move |identity| {
            if let Some(inner) = weak.upgrade() {
                inner.on_navigate(identity);
            }
        });
        debug!(target = "query_sync.table", view = %inner.name, manual_request, "mounting table view");
        inner.on_navigate(&observer.current());
        Ok(QueryTable { inner, observer })
    }
}

impl<T, P> Default for QueryTableOptions<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

struct TableDefaults {
    pagination: Pagination,
    sorters: Sorters,
    filters: Filters,
}

impl TableDefaults {
    fn state<T>(&self) -> QueryState<T> {
        QueryState::new(self.pagination, self.sorters.clone(), self.filters.clone())
    }
}

struct TableCore<T> {
    state: QueryState<T>,
    /// Identity the state was last initialized for.
    last_seen: Option<NavigationIdentity>,
}

struct TableInner<T, P> {
    name: String,
    defaults: TableDefaults,
    extras: Option<ExtrasFn>,
    manual_request: bool,
    params: Mutex<Option<P>>,
    source: Arc<dyn TableDataSource<T, P>>,
    bridge: HistoryBridge,
    resolver: RaceResolver,
    runtime: Handle,
    core: Mutex<TableCore<T>>,
    published: watch::Sender<QueryState<T>>,
}

impl<T, P> TableInner<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    fn on_navigate(self: &Arc<Self>, identity: &NavigationIdentity) {
        {
            let mut core = self.core.lock();
            if core.last_seen.as_ref() == Some(identity) {
                return;
            }
            core.last_seen = Some(identity.clone());
        }
        let update = match self.bridge.restore_table(&self.name) {
            Some(snapshot) => {
                debug!(target = "query_sync.table", view = %self.name, index = identity.index, "restoring saved query");
                TableUpdate::from(snapshot)
            }
            None => {
                debug!(target = "query_sync.table", view = %self.name, index = identity.index, "initializing query");
                self.initial_update()
            }
        };
        self.dispatch(TableAction::Update(update));
    }

    fn initial_update(&self) -> TableUpdate {
        let extras = self.extras.as_ref().map(|extras| extras()).unwrap_or_default();
        TableUpdate {
            pagination: self.defaults.pagination.merge(extras.pagination).into(),
            sorters: Some(extras.sorters.unwrap_or_else(|| self.defaults.sorters.clone())),
            filters: Some(extras.filters.unwrap_or_else(|| self.defaults.filters.clone())),
            invalidate: Some(!self.manual_request),
        }
    }

    /// Reduces under the lock; persisting and loading happen after release.
    fn dispatch(self: &Arc<Self>, action: TableAction<T>) {
        let name = action.name();
        let touches_query = action.touches_query();
        let state = {
            let mut core = self.core.lock();
            if matches!(action, TableAction::Reset(_)) {
                self.resolver.invalidate();
            }
            core.state = reduce(std::mem::take(&mut core.state), action);
            core.state.clone()
        };
        trace!(target = "query_sync.table", view = %self.name, action = name, invalidate = state.invalidate, "dispatched");
        let stale = touches_query && state.invalidate;
        let snapshot = state.snapshot();
        self.published.send_replace(state);
        if stale {
            self.bridge.persist_table(&self.name, &snapshot);
            self.reload();
        }
    }

    fn reload(self: &Arc<Self>) {
        let (ticket, request, state) = {
            let mut core = self.core.lock();
            let ticket = self.resolver.issue();
            core.state = reduce(std::mem::take(&mut core.state), TableAction::LoadRequest);
            let request = TableRequest {
                view: self.name.clone(),
                pagination: core.state.pagination,
                sorters: core.state.sorters.clone(),
                filters: core.state.filters.clone(),
                params: self.params.lock().clone(),
            };
            (ticket, request, core.state.clone())
        };
        self.published.send_replace(state);
        debug!(
            target = "query_sync.table",
            view = %self.name,
            ticket,
            page = request.pagination.current,
            page_size = request.pagination.page_size,
            "loading"
        );

        let source = Arc::clone(&self.source);
        let weak = Arc::downgrade(self);
        self.runtime.spawn(async move {
            let result = source.fetch(request).await;
            match weak.upgrade() {
                Some(inner) => inner.settle(ticket, result),
                None => trace!(target = "query_sync.table", ticket, "view dropped before load settled"),
            }
        });
    }

    fn settle(&self, ticket: Ticket, result: Result<Page<T>, LoadError>) {
        let state = {
            let mut core = self.core.lock();
            if !self.resolver.is_current(ticket) {
                trace!(target = "query_sync.table", view = %self.name, ticket, "discarding stale load");
                return;
            }
            let action = match result {
                Ok(page) => TableAction::LoadSuccess {
                    total: page.total,
                    data: page.data,
                },
                Err(err) => {
                    debug!(target = "query_sync.table", view = %self.name, ticket, error = %err, "load failed");
                    TableAction::LoadFailure(err)
                }
            };
            core.state = reduce(std::mem::take(&mut core.state), action);
            core.state.clone()
        };
        self.published.send_replace(state);
    }
}

/// A paginated, sorted, filtered view whose query lives in the current
/// history entry.
///
/// Navigating to an entry restores that entry's query (or the initial one)
/// and reloads; query changes are written back to the entry before loading.
pub struct QueryTable<T, P = ()> {
    inner: Arc<TableInner<T, P>>,
    observer: NavigationObserver,
}

impl<T, P> QueryTable<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    pub fn options() -> QueryTableOptions<T, P> {
        QueryTableOptions::new()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Identity of the history entry the view currently reflects.
    pub fn identity(&self) -> NavigationIdentity {
        self.observer.current()
    }

    pub fn state(&self) -> QueryState<T> {
        self.inner.core.lock().state.clone()
    }

    pub fn watch(&self) -> watch::Receiver<QueryState<T>> {
        self.inner.published.subscribe()
    }

    pub fn pagination(&self) -> Pagination {
        self.inner.core.lock().state.pagination
    }

    pub fn sorters(&self) -> Sorters {
        self.inner.core.lock().state.sorters.clone()
    }

    pub fn sort_order(&self, field: &str) -> Option<SortOrder> {
        self.inner.core.lock().state.sort_order(field)
    }

    pub fn filters(&self) -> Filters {
        self.inner.core.lock().state.filters.clone()
    }

    pub fn filter(&self, field: &str) -> Option<Vec<FilterValue>> {
        self.inner.core.lock().state.filter(field).map(<[_]>::to_vec)
    }

    pub fn data(&self) -> Vec<T> {
        self.inner.core.lock().state.data.clone()
    }

    pub fn error(&self) -> Option<LoadError> {
        self.inner.core.lock().state.error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.core.lock().state.loading
    }

    pub fn is_failed(&self) -> bool {
        self.inner.core.lock().state.is_failed()
    }

    pub fn update(&self, update: TableUpdate) {
        self.inner.dispatch(TableAction::Update(update));
    }

    /// Feeds a raw widget change event through [`TableChange::plan`].
    pub fn update_by_table_change(&self, change: TableChange) {
        let update = {
            let core = self.inner.core.lock();
            change.plan(&core.state)
        };
        self.update(update);
    }

    /// Back to the defaults; loads again unless the view is manual.
    pub fn reset(&self) {
        let next = QueryState {
            invalidate: !self.inner.manual_request,
            ..self.inner.defaults.state()
        };
        self.inner.dispatch(TableAction::Reset(next));
    }

    /// Loads the current query without touching history.
    pub fn reload(&self) {
        self.inner.reload();
    }

    pub fn params(&self) -> Option<P> {
        self.inner.params.lock().clone()
    }

    /// A different value invalidates the view.
    pub fn set_params(&self, params: Option<P>)
    where
        P: PartialEq,
    {
        {
            let mut current = self.inner.params.lock();
            if *current == params {
                return;
            }
            *current = params;
        }
        self.update(TableUpdate::default());
    }

    /// Resolves once no load is in flight.
    pub async fn until_idle(&self) -> QueryState<T> {
        let mut rx = self.watch();
        let settled = match rx.wait_for(|state| !state.loading).await {
            Ok(state) => Some(state.clone()),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| self.state())
    }
}

impl<T, P> std::fmt::Debug for QueryTable<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryTable")
            .field("name", &self.inner.name)
            .field("identity", &self.observer.current())
            .finish()
    }
}
