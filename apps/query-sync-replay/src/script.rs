//! Replay script format.
//!
//! ```json
//! {
//!   "table": "orders",
//!   "rows": [{"id": 1, "status": "open"}],
//!   "steps": [
//!     {"op": "push", "url": "/orders"},
//!     {"op": "table_change", "pagination": {"current": 2}},
//!     {"op": "settle"},
//!     {"op": "back"}
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::Context;
use query_sync::{
    Filters, PaginationPatch, SortOrder, SorterInput, SorterResult, Sorters, TableChange,
    TableUpdate,
};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_form")]
    pub form: String,
    /// Fixture rows served by the table's data source.
    #[serde(default)]
    pub rows: Vec<Value>,
    /// Simulated data source latency.
    #[serde(default)]
    pub latency_ms: u64,
    /// Initial form field values.
    #[serde(default)]
    pub fields: Map<String, Value>,
    pub steps: Vec<Step>,
}

fn default_table() -> String {
    "table".to_string()
}

fn default_form() -> String {
    "form".to_string()
}

impl Script {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing script {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Push {
        #[serde(default)]
        url: Option<String>,
    },
    /// Swaps in a fresh entry identity. Saved views are kept unless `clear`.
    Replace {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        clear: bool,
    },
    Back,
    Forward,
    Go {
        delta: i64,
    },
    TableChange {
        #[serde(default)]
        pagination: PaginationPatch,
        #[serde(default)]
        filters: Filters,
        #[serde(default)]
        sorters: Vec<ScriptSorter>,
    },
    Update {
        #[serde(default)]
        pagination: PaginationPatch,
        #[serde(default)]
        sorters: Option<Sorters>,
        #[serde(default)]
        filters: Option<Filters>,
    },
    Reset,
    Reload,
    FormSet {
        values: Map<String, Value>,
    },
    FormSubmit,
    FormReset,
    /// Waits for the table's in-flight load to finish.
    Settle,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptSorter {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub order: Option<SortOrder>,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Push { .. } => "push",
            Step::Replace { .. } => "replace",
            Step::Back => "back",
            Step::Forward => "forward",
            Step::Go { .. } => "go",
            Step::TableChange { .. } => "table_change",
            Step::Update { .. } => "update",
            Step::Reset => "reset",
            Step::Reload => "reload",
            Step::FormSet { .. } => "form_set",
            Step::FormSubmit => "form_submit",
            Step::FormReset => "form_reset",
            Step::Settle => "settle",
        }
    }
}

pub fn table_change(
    pagination: PaginationPatch,
    filters: Filters,
    sorters: Vec<ScriptSorter>,
) -> TableChange {
    let sorters = sorters
        .into_iter()
        .map(|sorter| SorterResult {
            field: sorter.field,
            order: sorter.order,
        })
        .collect();
    TableChange {
        pagination,
        filters,
        sorters: SorterInput::Multiple(sorters),
    }
}

pub fn table_update(
    pagination: PaginationPatch,
    sorters: Option<Sorters>,
    filters: Option<Filters>,
) -> TableUpdate {
    let mut update = TableUpdate::default().pagination(pagination).invalidate(true);
    if let Some(sorters) = sorters {
        update = update.sorters(sorters);
    }
    if let Some(filters) = filters {
        update = update.filters(filters);
    }
    update
}
