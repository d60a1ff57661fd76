use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE};
use crate::error::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current: u64,
    pub page_size: u64,
    #[serde(default)]
    pub total: u64,
}

impl Pagination {
    pub fn new(current: u64, page_size: u64) -> Self {
        Self {
            current,
            page_size,
            total: 0,
        }
    }

    pub fn merge(self, patch: PaginationPatch) -> Self {
        Self {
            current: patch.current.unwrap_or(self.current),
            page_size: patch.page_size.unwrap_or(self.page_size),
            total: patch.total.unwrap_or(self.total),
        }
        .normalized()
    }

    /// Page and page size are at least 1.
    pub fn normalized(self) -> Self {
        Self {
            current: self.current.max(1),
            page_size: self.page_size.max(1),
            total: self.total,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE, DEFAULT_PAGE_SIZE)
    }
}

/// Field-wise pagination override; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl PaginationPatch {
    pub fn page(current: u64) -> Self {
        Self {
            current: Some(current),
            ..Self::default()
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }
}

impl From<Pagination> for PaginationPatch {
    fn from(p: Pagination) -> Self {
        Self {
            current: Some(p.current),
            page_size: Some(p.page_size),
            total: Some(p.total),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascend,
    Descend,
}

/// Field name to direction; `None` marks an explicitly cleared sorter.
pub type Sorters = BTreeMap<String, Option<SortOrder>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Number(value.into())
    }
}

/// Field name to selected values; `None` marks an explicitly cleared filter.
pub type Filters = BTreeMap<String, Option<Vec<FilterValue>>>;

/// The query half of a view's state, as stored in a history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub pagination: Pagination,
    #[serde(default)]
    pub sorters: Sorters,
    #[serde(default)]
    pub filters: Filters,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    /// The current query has not been loaded since it last changed.
    pub invalidate: bool,
    pub pagination: Pagination,
    pub sorters: Sorters,
    pub filters: Filters,
    pub data: Vec<T>,
    pub error: Option<LoadError>,
    pub loading: bool,
}

impl<T> QueryState<T> {
    pub fn new(pagination: Pagination, sorters: Sorters, filters: Filters) -> Self {
        Self {
            invalidate: false,
            pagination: pagination.normalized(),
            sorters,
            filters,
            data: Vec::new(),
            error: None,
            loading: false,
        }
    }

    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            pagination: self.pagination,
            sorters: self.sorters.clone(),
            filters: self.filters.clone(),
        }
    }

    pub fn sort_order(&self, field: &str) -> Option<SortOrder> {
        self.sorters.get(field).copied().flatten()
    }

    pub fn filter(&self, field: &str) -> Option<&[FilterValue]> {
        self.filters.get(field).and_then(|v| v.as_deref())
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self::new(Pagination::default(), Sorters::new(), Filters::new())
    }
}

/// Partial update applied by `UPDATE`. Sorters and filters replace the
/// current maps wholesale when present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableUpdate {
    pub pagination: PaginationPatch,
    pub sorters: Option<Sorters>,
    pub filters: Option<Filters>,
    /// Defaults to `true` when absent.
    pub invalidate: Option<bool>,
}

impl TableUpdate {
    pub fn pagination(mut self, patch: PaginationPatch) -> Self {
        self.pagination = patch;
        self
    }

    pub fn sorters(mut self, sorters: Sorters) -> Self {
        self.sorters = Some(sorters);
        self
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn invalidate(mut self, invalidate: bool) -> Self {
        self.invalidate = Some(invalidate);
        self
    }
}

impl From<TableSnapshot> for TableUpdate {
    fn from(snapshot: TableSnapshot) -> Self {
        Self {
            pagination: snapshot.pagination.normalized().into(),
            sorters: Some(snapshot.sorters),
            filters: Some(snapshot.filters),
            invalidate: Some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_uses_history_layout() {
        let mut state: QueryState<()> = QueryState::default();
        state.pagination = Pagination {
            current: 3,
            page_size: 20,
            total: 95,
        };
        state.sorters.insert("name".into(), Some(SortOrder::Descend));
        state
            .filters
            .insert("status".into(), Some(vec!["open".into(), 2i64.into()]));
        state.filters.insert("owner".into(), None);
        assert_eq!(
            serde_json::to_value(state.snapshot()).unwrap(),
            json!({
                "pagination": {"current": 3, "pageSize": 20, "total": 95},
                "sorters": {"name": "descend"},
                "filters": {"owner": null, "status": ["open", 2]},
            })
        );
    }

    #[test]
    fn snapshot_tolerates_missing_maps() {
        let snapshot: TableSnapshot =
            serde_json::from_value(json!({"pagination": {"current": 2, "pageSize": 10}})).unwrap();
        assert_eq!(snapshot.pagination, Pagination::new(2, 10));
        assert!(snapshot.sorters.is_empty());
        assert!(snapshot.filters.is_empty());
    }

    #[test]
    fn merge_keeps_unpatched_fields_and_floors_pages() {
        let base = Pagination {
            current: 4,
            page_size: 15,
            total: 80,
        };
        assert_eq!(
            base.merge(PaginationPatch::page(2)),
            Pagination {
                current: 2,
                page_size: 15,
                total: 80
            }
        );
        assert_eq!(base.merge(PaginationPatch::page(0).with_page_size(0)).current, 1);
        assert_eq!(base.merge(PaginationPatch::default().with_page_size(0)).page_size, 1);
    }

    #[test]
    fn accessors_flatten_cleared_entries() {
        let mut state: QueryState<()> = QueryState::default();
        state.sorters.insert("age".into(), None);
        state.filters.insert("tag".into(), None);
        assert_eq!(state.sort_order("age"), None);
        assert_eq!(state.sort_order("unknown"), None);
        assert_eq!(state.filter("tag"), None);
        state.filters.insert("tag".into(), Some(vec![true.into()]));
        assert_eq!(state.filter("tag"), Some(&[FilterValue::Bool(true)][..]));
    }
}
