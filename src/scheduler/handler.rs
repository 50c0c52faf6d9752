//! Submission interface: admits payloads into the queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::bridge::ResultBridge;
use super::error::{ContractViolation, QueueError, RequestError};
use super::queue::OrderedQueue;
use super::work::{Output, Payload, ResultHandle, WorkUnit};
use crate::shutdown::ShutdownCoordinator;
use crate::telemetry;

/// Configuration for admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Queue length at which new submissions are rejected.
    pub max_queue_size: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self { max_queue_size: 32_000 }
    }
}

/// Front door of the batching core.
pub struct BatchHandler<P, R> {
    queue: Arc<OrderedQueue<P, R>>,
    bridge: ResultBridge<P, R>,
    shutdown: Arc<ShutdownCoordinator>,
    max_queue_size: usize,
    next_id: AtomicU64,
}

impl<P: Payload, R: Output> BatchHandler<P, R> {
    pub fn new(
        queue: Arc<OrderedQueue<P, R>>,
        bridge: ResultBridge<P, R>,
        shutdown: Arc<ShutdownCoordinator>,
        config: HandlerConfig,
    ) -> Result<Self, ContractViolation> {
        if config.max_queue_size == 0 {
            return Err(ContractViolation::ZeroQueueSize);
        }
        Ok(Self {
            queue,
            bridge,
            shutdown,
            max_queue_size: config.max_queue_size,
            next_id: AtomicU64::new(1),
        })
    }

    /// Submit one payload. Cache hits complete immediately without queueing.
    pub async fn submit(&self, payload: P) -> Result<ResultHandle<P, R>, QueueError> {
        let mut handles = self.submit_many(vec![payload]).await?;
        handles.pop().ok_or(QueueError::ShuttingDown)
    }

    /// Submit several payloads; cache misses are pushed in one atomic insert.
    ///
    /// Handles are returned in input order.
    pub async fn submit_many(
        &self,
        payloads: Vec<P>,
    ) -> Result<Vec<ResultHandle<P, R>>, QueueError> {
        if !self.shutdown.is_accepting() {
            return Err(QueueError::ShuttingDown);
        }

        let mut handles = Vec::with_capacity(payloads.len());
        let mut units = Vec::new();
        for payload in payloads {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if let Some(value) = self.bridge.lookup(&payload).await {
                handles.push(ResultHandle::cached(id, payload, value));
                continue;
            }
            units.push((id, payload));
        }
        // Hits only count once the whole submission is accepted.
        let cache_hits = handles.len();

        if units.is_empty() {
            telemetry::record_cache_hits(cache_hits);
            return Ok(handles);
        }

        let current = self.queue.len();
        if current + units.len() > self.max_queue_size {
            return Err(QueueError::QueueFull { current, max: self.max_queue_size });
        }

        let mut queued = Vec::with_capacity(units.len());
        for (id, payload) in units {
            let guard = self.shutdown.track().ok_or(QueueError::ShuttingDown)?;
            let (unit, handle) = WorkUnit::with_guard(id, payload, Some(guard));
            queued.push(unit);
            handles.push(handle);
        }
        let len = self.queue.push(queued);
        tracing::trace!(queue_len = len, cache_hits, "submitted work units");
        telemetry::record_cache_hits(cache_hits);

        handles.sort_by_key(|h| h.id());
        Ok(handles)
    }

    /// Submit and wait for the result through the bridge.
    pub async fn infer(&self, payload: P) -> Result<R, RequestError> {
        let handle = self.submit(payload).await?;
        Ok(self.bridge.await_result(&handle).await?)
    }

    /// Wait for a previously submitted handle through the bridge.
    pub async fn await_result(&self, handle: &ResultHandle<P, R>) -> Result<R, RequestError> {
        Ok(self.bridge.await_result(handle).await?)
    }

    /// Advisory queue length.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn bridge(&self) -> &ResultBridge<P, R> {
        &self.bridge
    }
}
