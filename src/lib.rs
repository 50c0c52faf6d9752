//! GG-BATCH Runtime
//!
//! The request-batching core of the GG inference runtime. Many concurrent
//! callers submit independent work units; a single consumer loop groups them
//! into near-optimal batches for a compute backend and routes each result
//! back to the caller awaiting it.
//!
//! # Guarantees
//!
//! - **Bounded latency**: entries older than the residency limit fail fast
//!   with a timeout instead of starving.
//! - **Exactly-once completion**: every result slot settles once; later
//!   completion attempts are no-ops.
//! - **No silent loss**: every admitted unit reaches a terminal state while
//!   the consumer loop runs, and leftovers fail at shutdown.
//!
//! Model execution, network front ends and cache storage live outside this
//! crate behind [`scheduler::ComputeBackend`] and [`scheduler::ResultCache`].

pub mod config;
pub mod scheduler;
pub mod shutdown;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use scheduler::{
    spawn_worker, BatchConfig, BatchExtractor, BatchHandler, ComputeBackend, ContractViolation,
    HandlerConfig, OrderedQueue, OutputCache, OutputCacheConfig, Output, Payload, ResultBridge,
    ResultCache,
};
use shutdown::{ShutdownCoordinator, ShutdownResult};

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub batch: BatchConfig,
    pub handler: HandlerConfig,
    /// In-memory result cache. `None` disables caching.
    pub cache: Option<OutputCacheConfig>,
    pub shutdown_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            handler: HandlerConfig::default(),
            cache: None,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// A running batching runtime: queue, handler, and consumer loop.
pub struct Runtime<P, R> {
    handler: Arc<BatchHandler<P, R>>,
    queue: Arc<OrderedQueue<P, R>>,
    shutdown: Arc<ShutdownCoordinator>,
    worker_token: CancellationToken,
    worker: JoinHandle<()>,
    shutdown_timeout: Duration,
}

impl<P: Payload, R: Output> Runtime<P, R> {
    /// Start the runtime, using the in-memory [`OutputCache`] when configured.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: RuntimeConfig,
        backend: Arc<dyn ComputeBackend<P, R>>,
    ) -> Result<Self, ContractViolation> {
        let cache = config.cache.clone().map(|c| {
            Arc::new(OutputCache::<R>::new(c)) as Arc<dyn ResultCache<P, R>>
        });
        Self::start_with_cache(config, backend, cache)
    }

    /// Start the runtime with a caller-provided result cache.
    pub fn start_with_cache(
        config: RuntimeConfig,
        backend: Arc<dyn ComputeBackend<P, R>>,
        cache: Option<Arc<dyn ResultCache<P, R>>>,
    ) -> Result<Self, ContractViolation> {
        config.batch.validate()?;

        let queue = Arc::new(OrderedQueue::new());
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let handler = Arc::new(BatchHandler::new(
            Arc::clone(&queue),
            ResultBridge::new(cache),
            Arc::clone(&shutdown),
            config.handler.clone(),
        )?);

        let worker_token = CancellationToken::new();
        let worker = spawn_worker(
            BatchExtractor::new(Arc::clone(&queue)),
            backend,
            config.batch.clone(),
            worker_token.clone(),
        );

        Ok(Self {
            handler,
            queue,
            shutdown,
            worker_token,
            worker,
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// Submission interface shared with front ends.
    pub fn handler(&self) -> &Arc<BatchHandler<P, R>> {
        &self.handler
    }

    /// Advisory queue length.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Stop admission, drain in-flight units, and stop the consumer loop.
    ///
    /// Anything still queued once the loop is gone fails with `ShutDown`,
    /// even if the loop ended abnormally.
    pub async fn shutdown(self) -> ShutdownResult {
        let result = self.shutdown.initiate(self.shutdown_timeout).await;
        self.worker_token.cancel();
        if let Err(e) = self.worker.await {
            tracing::error!(error = %e, "worker task failed during shutdown");
        }
        scheduler::fail_leftovers(&self.queue);
        result
    }
}
