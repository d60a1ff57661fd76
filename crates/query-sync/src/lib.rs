//! History-synchronized query state for table and form views.
//!
//! A [`QueryTable`] keeps pagination, sorters and filters in the current
//! history entry and reloads its rows whenever that query changes or the
//! user navigates. A [`QueryForm`] does the same for form field values.
//! Both are driven by a [`history_nav::NavigationTracker`].

pub mod bridge;
pub mod codec;
pub mod config;
pub mod error;
pub mod form;
pub mod table;
pub mod ticket;

pub use bridge::{HistoryBridge, FORM_NAMESPACE, TABLE_NAMESPACE};
pub use codec::{
    DateAdapter, FieldMap, FieldValue, TaggedCodec, TimestampAdapter, TypeAdapter, ValueCodec,
};
pub use config::EngineConfig;
pub use error::{CodecError, ConfigError, LoadError};
pub use form::{FormFields, MemoryForm, QueryForm, QueryFormOptions};
pub use table::{
    FilterValue, Filters, Page, Pagination, PaginationPatch, QueryState, QueryTable,
    QueryTableOptions, SortOrder, SorterInput, SorterResult, Sorters, TableAction, TableChange,
    TableDataSource, TableExtras, TableRequest, TableSnapshot, TableUpdate,
};
pub use ticket::{RaceResolver, Ticket};

pub type LoadResult<T> = Result<T, LoadError>;
