use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use query_sync::{
    FilterValue, LoadError, Page, SortOrder, TableDataSource, TableRequest,
};
use serde_json::Value;
use tracing::debug;

/// Serves pages out of the script's rows: filter, sort, then slice.
#[derive(Clone)]
pub struct FixtureSource {
    rows: Arc<Vec<Value>>,
    latency: Duration,
}

impl FixtureSource {
    pub fn new(rows: Vec<Value>, latency: Duration) -> Self {
        Self {
            rows: Arc::new(rows),
            latency,
        }
    }

    pub fn query(&self, request: &TableRequest<()>) -> Page<Value> {
        let mut matched: Vec<&Value> = self
            .rows
            .iter()
            .filter(|row| {
                request.filters.iter().all(|(field, accepted)| match accepted {
                    Some(accepted) if !accepted.is_empty() => {
                        accepted.iter().any(|want| matches_filter(row.get(field), want))
                    }
                    _ => true,
                })
            })
            .collect();

        for (field, order) in request.sorters.iter().rev() {
            let Some(order) = order else { continue };
            matched.sort_by(|a, b| {
                let ordering = compare(a.get(field), b.get(field));
                match order {
                    SortOrder::Ascend => ordering,
                    SortOrder::Descend => ordering.reverse(),
                }
            });
        }

        let total = matched.len() as u64;
        let size = request.pagination.page_size.max(1);
        let skip = request.pagination.current.saturating_sub(1).saturating_mul(size);
        let data = matched
            .into_iter()
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(usize::try_from(size).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Page::new(data, total)
    }
}

#[async_trait]
impl TableDataSource<Value, ()> for FixtureSource {
    async fn fetch(&self, request: TableRequest<()>) -> Result<Page<Value>, LoadError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let page = self.query(&request);
        debug!(
            target = "query_sync_replay.fixture",
            view = %request.view,
            page = request.pagination.current,
            total = page.total,
            "served fixture page"
        );
        Ok(page)
    }
}

fn matches_filter(cell: Option<&Value>, want: &FilterValue) -> bool {
    match (cell, want) {
        (Some(Value::Bool(have)), FilterValue::Bool(want)) => have == want,
        (Some(Value::Number(have)), FilterValue::Number(want)) => have.as_f64() == want.as_f64(),
        (Some(Value::String(have)), FilterValue::Text(want)) => have == want,
        (Some(Value::Array(items)), want) => items.iter().any(|item| matches_filter(Some(item), want)),
        _ => false,
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
