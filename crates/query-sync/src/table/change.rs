//! Translation of raw table-widget change events into store updates.

use std::collections::{BTreeMap, BTreeSet};

use super::state::{Filters, PaginationPatch, QueryState, SortOrder, Sorters, TableUpdate};

/// One column's sort as reported by the widget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SorterResult {
    pub field: Option<String>,
    pub order: Option<SortOrder>,
}

impl SorterResult {
    pub fn new(field: impl Into<String>, order: Option<SortOrder>) -> Self {
        Self {
            field: Some(field.into()),
            order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SorterInput {
    Single(SorterResult),
    Multiple(Vec<SorterResult>),
}

impl Default for SorterInput {
    fn default() -> Self {
        SorterInput::Multiple(Vec::new())
    }
}

impl SorterInput {
    /// Field to direction mapping; entries without a field are dropped.
    pub fn normalize(&self) -> Sorters {
        let items = match self {
            SorterInput::Single(item) => std::slice::from_ref(item),
            SorterInput::Multiple(items) => items.as_slice(),
        };
        items
            .iter()
            .filter_map(|item| item.field.clone().map(|field| (field, item.order)))
            .collect()
    }
}

/// A raw change event: requested pagination, the full filter map and the
/// sorter(s) now active.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableChange {
    pub pagination: PaginationPatch,
    pub filters: Filters,
    pub sorters: SorterInput,
}

impl TableChange {
    /// Builds the update for `state`. A changed page size, filter set or
    /// sorter set sends the view back to page 1 with an unknown total.
    pub fn plan<T>(self, state: &QueryState<T>) -> TableUpdate {
        let sorters = self.sorters.normalize();
        let page_size_changed = self
            .pagination
            .page_size
            .is_some_and(|size| size != state.pagination.page_size);
        let reposition = page_size_changed
            || !filters_equivalent(&self.filters, &state.filters)
            || !sorters_equivalent(&sorters, &state.sorters);
        let current = state.pagination;
        let pagination = if reposition {
            PaginationPatch {
                current: Some(1),
                page_size: Some(self.pagination.page_size.unwrap_or(current.page_size)),
                total: Some(0),
            }
        } else {
            PaginationPatch {
                current: Some(self.pagination.current.unwrap_or(current.current)),
                page_size: Some(current.page_size),
                total: Some(self.pagination.total.unwrap_or(current.total)),
            }
        };
        TableUpdate {
            pagination,
            sorters: Some(sorters),
            filters: Some(self.filters),
            invalidate: Some(true),
        }
    }
}

/// Deep equality where a missing key and an explicit `None` are the same.
pub fn sorters_equivalent(a: &Sorters, b: &Sorters) -> bool {
    keys(a, b).all(|key| a.get(key).copied().flatten() == b.get(key).copied().flatten())
}

pub fn filters_equivalent(a: &Filters, b: &Filters) -> bool {
    keys(a, b).all(|key| a.get(key).and_then(Option::as_ref) == b.get(key).and_then(Option::as_ref))
}

fn keys<'a, V>(
    a: &'a BTreeMap<String, V>,
    b: &'a BTreeMap<String, V>,
) -> impl Iterator<Item = &'a String> {
    a.keys().chain(b.keys()).collect::<BTreeSet<_>>().into_iter()
}
