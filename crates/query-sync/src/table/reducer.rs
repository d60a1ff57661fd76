use crate::error::LoadError;

use super::state::{Pagination, QueryState, TableUpdate};

#[derive(Debug, Clone, PartialEq)]
pub enum TableAction<T> {
    LoadRequest,
    LoadSuccess { total: u64, data: Vec<T> },
    LoadFailure(LoadError),
    Update(TableUpdate),
    Reset(QueryState<T>),
}

impl<T> TableAction<T> {
    pub fn name(&self) -> &'static str {
        match self {
            TableAction::LoadRequest => "LOAD_REQUEST",
            TableAction::LoadSuccess { .. } => "LOAD_SUCCESS",
            TableAction::LoadFailure(_) => "LOAD_FAILURE",
            TableAction::Update(_) => "UPDATE",
            TableAction::Reset(_) => "RESET",
        }
    }

    /// Actions that may leave the query stale and so need persisting.
    pub fn touches_query(&self) -> bool {
        matches!(self, TableAction::Update(_) | TableAction::Reset(_))
    }
}

pub fn reduce<T>(state: QueryState<T>, action: TableAction<T>) -> QueryState<T> {
    match action {
        TableAction::LoadRequest => QueryState {
            loading: true,
            ..state
        },
        TableAction::LoadSuccess { total, data } => QueryState {
            invalidate: false,
            pagination: Pagination {
                total,
                ..state.pagination
            },
            data,
            error: None,
            loading: false,
            ..state
        },
        TableAction::LoadFailure(error) => QueryState {
            error: Some(error),
            loading: false,
            ..state
        },
        TableAction::Update(update) => QueryState {
            pagination: state.pagination.merge(update.pagination),
            sorters: update.sorters.unwrap_or(state.sorters),
            filters: update.filters.unwrap_or(state.filters),
            invalidate: update.invalidate.unwrap_or(true),
            ..state
        },
        TableAction::Reset(next) => next,
    }
}
