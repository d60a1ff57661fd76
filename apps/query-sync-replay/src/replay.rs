use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use history_nav::{MemoryHistory, NavigationIdentity, NavigationTracker};
use query_sync::{
    EngineConfig, FieldMap, FieldValue, Filters, FormFields, MemoryForm, Pagination, QueryForm,
    QueryTable, Sorters, TaggedCodec,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::fixture::FixtureSource;
use crate::script::{table_change, table_update, Script, Step};

/// View state printed after each step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub op: &'static str,
    pub location: String,
    pub navigation: NavigationIdentity,
    pub table: TableReport,
    pub form: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub pagination: Pagination,
    pub sorters: Sorters,
    pub filters: Filters,
    pub loading: bool,
    pub error: Option<String>,
    pub rows: Vec<Value>,
}

/// One table view and one form view over an in-memory history.
pub struct Replay {
    tracker: Arc<NavigationTracker>,
    table: QueryTable<Value>,
    query_form: QueryForm,
    form: Arc<MemoryForm>,
    codec: TaggedCodec,
}

impl Replay {
    pub fn new(script: &Script, config: EngineConfig) -> anyhow::Result<Self> {
        let tracker = NavigationTracker::install(Arc::new(MemoryHistory::new("/")));
        let source = FixtureSource::new(script.rows.clone(), Duration::from_millis(script.latency_ms));
        let table = QueryTable::options()
            .name(script.table.clone())
            .config(config)
            .source(source)
            .build(&tracker)
            .context("building table view")?;

        let initial: FieldMap = script
            .fields
            .iter()
            .map(|(field, value)| (field.clone(), FieldValue::from(value.clone())))
            .collect();
        let form = Arc::new(MemoryForm::new(initial));
        let query_form = QueryForm::options()
            .name(script.form.clone())
            .form(Arc::clone(&form) as Arc<dyn FormFields>)
            .build(&tracker);

        Ok(Self {
            tracker,
            table,
            query_form,
            form,
            codec: TaggedCodec::new(),
        })
    }

    pub async fn run(&self, steps: &[Step]) -> anyhow::Result<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            debug!(target = "query_sync_replay", step = index, op = step.name(), "applying step");
            self.apply(step)
                .await
                .with_context(|| format!("step {index} ({})", step.name()))?;
            reports.push(self.report(index, step.name()));
        }
        info!(target = "query_sync_replay", steps = steps.len(), "replay finished");
        Ok(reports)
    }

    async fn apply(&self, step: &Step) -> anyhow::Result<()> {
        match step {
            Step::Push { url } => {
                self.tracker.push(json!({}), url.as_deref());
            }
            Step::Replace { url, clear } => {
                let data = if *clear {
                    json!({})
                } else {
                    self.tracker.current_state()
                };
                self.tracker.replace(data, url.as_deref());
            }
            Step::Back => {
                self.tracker.back()?;
            }
            Step::Forward => {
                self.tracker.forward()?;
            }
            Step::Go { delta } => {
                self.tracker.go(*delta)?;
            }
            Step::TableChange {
                pagination,
                filters,
                sorters,
            } => {
                self.table.update_by_table_change(table_change(
                    *pagination,
                    filters.clone(),
                    sorters.clone(),
                ));
            }
            Step::Update {
                pagination,
                sorters,
                filters,
            } => {
                self.table
                    .update(table_update(*pagination, sorters.clone(), filters.clone()));
            }
            Step::Reset => self.table.reset(),
            Step::Reload => self.table.reload(),
            Step::FormSet { values } => {
                for (field, value) in values {
                    self.form.set(field.clone(), FieldValue::from(value.clone()));
                }
            }
            Step::FormSubmit => self.query_form.submit(),
            Step::FormReset => self.query_form.reset_fields(),
            Step::Settle => {
                self.table.until_idle().await;
            }
        }
        Ok(())
    }

    fn report(&self, step: usize, op: &'static str) -> StepReport {
        let state = self.table.state();
        let form = self
            .query_form
            .values()
            .and_then(|values| self.codec.encode(&FieldValue::Map(values)).ok());
        StepReport {
            step,
            op,
            location: self.tracker.location(),
            navigation: self.tracker.current(),
            table: TableReport {
                pagination: state.pagination,
                sorters: state.sorters,
                filters: state.filters,
                loading: state.loading,
                error: state.error.map(|err| err.to_string()),
                rows: state.data,
            },
            form,
        }
    }
}
