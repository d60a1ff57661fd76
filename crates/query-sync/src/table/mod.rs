//! Table views: query state, its reducer and the history-backed store.

mod change;
mod reducer;
mod source;
mod state;
mod store;

pub use change::{filters_equivalent, sorters_equivalent, SorterInput, SorterResult, TableChange};
pub use reducer::{reduce, TableAction};
pub use source::{Page, TableDataSource, TableRequest};
pub use state::{
    FilterValue, Filters, Pagination, PaginationPatch, QueryState, SortOrder, Sorters,
    TableSnapshot, TableUpdate,
};
pub use store::{QueryTable, QueryTableOptions, TableExtras};
