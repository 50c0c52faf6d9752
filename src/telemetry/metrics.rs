//! Metric recorders for the batching core.
//!
//! Recording is a no-op until a recorder is installed by the host process.

use metrics::{counter, gauge, histogram};

/// Advisory queue length after a mutation.
pub fn record_queue_depth(depth: usize) {
    gauge!("gg_batch_queue_depth").set(depth as f64);
}

/// Entries failed by the residency purger, tagged with the configured limit.
pub fn record_purged(count: usize, limit_ms: u64) {
    counter!("gg_batch_purged_total", "limit_ms" => limit_ms.to_string()).increment(count as u64);
    counter!("gg_batch_requests_failed_total", "reason" => "timeout").increment(count as u64);
}

/// A batch completed successfully on the backend.
pub fn record_batch(size: usize, latency_ms: u64) {
    counter!("gg_batch_batches_total").increment(1);
    histogram!("gg_batch_batch_size").record(size as f64);
    histogram!("gg_batch_batch_latency_ms").record(latency_ms as f64);
}

/// A single request failed for `reason`.
pub fn record_request_failure(reason: &'static str) {
    counter!("gg_batch_requests_failed_total", "reason" => reason).increment(1);
}

/// Requests answered from the result cache by an accepted submission.
pub fn record_cache_hits(count: usize) {
    if count > 0 {
        counter!("gg_batch_cache_hits_total").increment(count as u64);
    }
}
