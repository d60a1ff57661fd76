//! Select option loading on top of `query-sync`.
//!
//! [`SearchSelect`] queries a [`SearchSource`] per debounced keystroke;
//! [`RemoteSelect`] loads a whole list from a [`ListSource`] once and
//! filters it locally. Both drop superseded responses through a
//! [`query_sync::RaceResolver`].

pub mod fields;
pub mod remote;
pub mod search;
pub mod source;

use thiserror::Error;

pub use fields::{keyword_filter, FieldNames, FieldRef, FromField, OptionPayload, SelectOption};
pub use remote::{RemoteSelect, RemoteSelectOptions, RemoteState};
pub use search::{SearchSelect, SearchSelectOptions, SearchSettings, SearchState};
pub use source::{CachedOptionSource, ListSource, SearchSource};

#[derive(Debug, Error)]
pub enum OptionError {
    #[error("option items must serialize to objects, found {found}")]
    NotAnObject { found: &'static str },
    #[error("failed to serialize option item: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("select created outside a tokio runtime")]
    NoRuntime,
}
