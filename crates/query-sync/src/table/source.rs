use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LoadError;

use super::state::{Filters, Pagination, Sorters};

/// Everything a data source needs to fetch one page.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRequest<P> {
    pub view: String,
    pub pagination: Pagination,
    pub sorters: Sorters,
    pub filters: Filters,
    pub params: Option<P>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64) -> Self {
        Self { data, total }
    }
}

#[async_trait]
pub trait TableDataSource<T, P>: Send + Sync {
    async fn fetch(&self, request: TableRequest<P>) -> Result<Page<T>, LoadError>;
}

#[async_trait]
impl<T, P, F, Fut> TableDataSource<T, P> for F
where
    F: Fn(TableRequest<P>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Page<T>, LoadError>> + Send + 'static,
    T: Send + 'static,
    P: Send + 'static,
{
    async fn fetch(&self, request: TableRequest<P>) -> Result<Page<T>, LoadError> {
        (self)(request).await
    }
}
