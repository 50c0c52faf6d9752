//! Single consumer loop: pull batches and execute them on the backend.
//!
//! Producers only touch the queue; this loop is the one place that drains
//! it, so the purge-then-drain sequence stays deterministic.

use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::batch::{BatchConfig, BatchExtractor};
use super::error::{BackendError, BatchError};
use super::queue::OrderedQueue;
use super::work::{Output, Payload, WorkUnit};
use crate::telemetry::{self, BatchSpan, SpanExt};

/// Model-execution backend turning a batch of payloads into results.
///
/// Results must be positionally aligned with the input batch.
#[async_trait]
pub trait ComputeBackend<P, R>: Send + Sync {
    async fn execute(&self, batch: &[Arc<P>]) -> Result<Vec<R>, BackendError>;
}

/// Spawn the consumer loop. Returns a handle for shutdown.
pub fn spawn_worker<P: Payload, R: Output>(
    extractor: BatchExtractor<P, R>,
    backend: Arc<dyn ComputeBackend<P, R>>,
    config: BatchConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        worker_loop(&extractor, backend.as_ref(), &config, shutdown).await;
    })
}

async fn worker_loop<P: Payload, R: Output>(
    extractor: &BatchExtractor<P, R>,
    backend: &dyn ComputeBackend<P, R>,
    config: &BatchConfig,
    shutdown: CancellationToken,
) {
    tracing::info!(
        batch_size = config.batch_size,
        max_batches_per_pull = config.max_batches_per_pull,
        "worker: started"
    );
    loop {
        let pulled = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            pulled = extractor.pull(config) => pulled,
        };
        let batches = match pulled {
            Ok(batches) => batches,
            Err(e) => {
                tracing::error!(error = %e, "worker: invalid batch configuration");
                break;
            }
        };
        // Unyielded batches are requeued if the loop stops mid-window.
        for batch in batches {
            execute_batch(batch, backend).await;
            if shutdown.is_cancelled() {
                break;
            }
        }
    }

    fail_leftovers(extractor.queue());
    tracing::info!("worker: stopped");
}

/// Fail every entry still queued with `ShutDown`.
pub(crate) fn fail_leftovers<P: Payload, R: Output>(queue: &OrderedQueue<P, R>) {
    let leftover = queue.drain_all();
    if !leftover.is_empty() {
        tracing::warn!(count = leftover.len(), "worker: failing requests left at shutdown");
    }
    for entry in leftover {
        if entry.unit.complete(Err(BatchError::ShutDown)) {
            telemetry::record_request_failure(BatchError::ShutDown.reason());
        }
    }
}

/// Run one batch and complete every unit in it.
///
/// A backend that panics is treated like one that returned an error.
pub async fn execute_batch<P: Payload, R: Output>(
    batch: Vec<WorkUnit<P, R>>,
    backend: &dyn ComputeBackend<P, R>,
) {
    if batch.is_empty() {
        return;
    }
    let span = BatchSpan::new(batch.len());

    let inputs: Vec<Arc<P>> = batch.iter().map(|u| Arc::clone(u.content())).collect();
    let start = Instant::now();
    let executed = AssertUnwindSafe(backend.execute(&inputs))
        .catch_unwind()
        .instrument(span.clone())
        .await
        .unwrap_or_else(|panic| Err(BackendError::Execution(panic_message(panic.as_ref()))));
    let elapsed = start.elapsed();

    let outcome = executed
        .and_then(|outputs| {
            if outputs.len() == batch.len() {
                Ok(outputs)
            } else {
                Err(BackendError::ResultCountMismatch {
                    expected: batch.len(),
                    actual: outputs.len(),
                })
            }
        })
        .map_err(|e| {
            tracing::error!(parent: &span, error = %e, size = batch.len(), "worker: batch failed");
            BatchError::Upstream(e.to_string())
        });
    span.record_latency(elapsed);
    span.record_outcome(&outcome);

    match outcome {
        Ok(outputs) => {
            telemetry::record_batch(batch.len(), elapsed.as_millis() as u64);
            for (unit, output) in batch.iter().zip(outputs) {
                unit.complete(Ok(output));
            }
        }
        Err(failure) => {
            for unit in &batch {
                if unit.complete(Err(failure.clone())) {
                    telemetry::record_request_failure(failure.reason());
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload");
    format!("backend panicked: {detail}")
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
