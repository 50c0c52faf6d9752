//! Result bridge: routes completed results back to callers, with an optional
//! result cache in front of the queue.

use async_trait::async_trait;
use std::sync::Arc;

use super::work::{Outcome, Output, Payload, ResultHandle, ResultSlot};

/// Lookup/store contract for a result cache.
#[async_trait]
pub trait ResultCache<P, R>: Send + Sync {
    /// Return a stored value for `content`, if any.
    async fn try_get(&self, content: &P) -> Option<R>;

    /// Store a computed value for `content`.
    async fn put(&self, content: &P, value: R);
}

/// Completes callers' waits and keeps the optional cache populated.
pub struct ResultBridge<P, R> {
    cache: Option<Arc<dyn ResultCache<P, R>>>,
}

impl<P, R> Clone for ResultBridge<P, R> {
    fn clone(&self) -> Self {
        Self { cache: self.cache.clone() }
    }
}

impl<P: Payload, R: Output> ResultBridge<P, R> {
    pub fn new(cache: Option<Arc<dyn ResultCache<P, R>>>) -> Self {
        Self { cache }
    }

    /// Bridge with no cache.
    pub fn uncached() -> Self {
        Self { cache: None }
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Check the cache before a payload is enqueued.
    pub async fn lookup(&self, content: &P) -> Option<R> {
        let cache = self.cache.as_ref()?;
        cache.try_get(content).await
    }

    /// Store the value for `content` once `pending` completes successfully.
    ///
    /// Detached from the caller; failures are never cached.
    pub fn put_when_ready(&self, content: Arc<P>, pending: ResultSlot<R>) {
        let Some(cache) = self.cache.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Ok(value) = pending.wait().await {
                cache.put(&content, value).await;
            }
        });
    }

    /// Wait for a handle's result.
    ///
    /// With a cache configured, the value is stored in the background once
    /// ready, unless it was served from the cache in the first place. The
    /// store is scheduled at most once per handle.
    pub async fn await_result(&self, handle: &ResultHandle<P, R>) -> Outcome<R> {
        if self.cache.is_some() && !handle.is_cached() && handle.claim_cache_store() {
            self.put_when_ready(Arc::clone(handle.content()), handle.slot().clone());
        }
        handle.wait().await
    }
}
