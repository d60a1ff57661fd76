use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use query_sync::LoadError;
use tracing::debug;

use crate::fields::OptionPayload;

/// Keyword-driven option source.
#[async_trait]
pub trait SearchSource<T>: Send + Sync {
    async fn search(&self, term: String) -> Result<OptionPayload<T>, LoadError>;
}

#[async_trait]
impl<T, F, Fut> SearchSource<T> for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<OptionPayload<T>, LoadError>> + Send + 'static,
    T: Send + 'static,
{
    async fn search(&self, term: String) -> Result<OptionPayload<T>, LoadError> {
        (self)(term).await
    }
}

/// Whole-list option source.
#[async_trait]
pub trait ListSource<T>: Send + Sync {
    async fn load(&self) -> Result<OptionPayload<T>, LoadError>;
}

#[async_trait]
impl<T, F, Fut> ListSource<T> for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<OptionPayload<T>, LoadError>> + Send + 'static,
    T: Send + 'static,
{
    async fn load(&self) -> Result<OptionPayload<T>, LoadError> {
        (self)().await
    }
}

type SharedLoad<T> = Shared<BoxFuture<'static, Result<Vec<T>, LoadError>>>;

/// Shares one in-flight or completed load between every caller, so several
/// selects over the same list hit the source once. A failed load is
/// discarded and the next caller starts a fresh one.
pub struct CachedOptionSource<T> {
    source: Arc<dyn ListSource<T>>,
    slot: Mutex<(u64, SharedLoad<T>)>,
}

impl<T> CachedOptionSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<S>(source: S) -> Self
    where
        S: ListSource<T> + 'static,
    {
        Self::from_shared(Arc::new(source))
    }

    pub fn from_shared(source: Arc<dyn ListSource<T>>) -> Self {
        let first = start(&source);
        Self {
            source,
            slot: Mutex::new((0, first)),
        }
    }

    /// Number of times the underlying load has been restarted.
    pub fn generation(&self) -> u64 {
        self.slot.lock().0
    }
}

fn start<T>(source: &Arc<dyn ListSource<T>>) -> SharedLoad<T>
where
    T: Clone + Send + Sync + 'static,
{
    let source = Arc::clone(source);
    async move { source.load().await.map(OptionPayload::into_items) }
        .boxed()
        .shared()
}

#[async_trait]
impl<T> ListSource<T> for CachedOptionSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn load(&self) -> Result<OptionPayload<T>, LoadError> {
        let (generation, pending) = {
            let slot = self.slot.lock();
            (slot.0, slot.1.clone())
        };
        let result = pending.await;
        if let Err(err) = &result {
            let mut slot = self.slot.lock();
            if slot.0 == generation {
                debug!(target = "remote_options.source", generation, error = %err, "cached load failed; restarting on next use");
                *slot = (generation + 1, start(&self.source));
            }
        }
        result.map(OptionPayload::List)
    }
}
