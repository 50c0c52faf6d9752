//! Per-batch tracing spans.

use std::time::Duration;
use tracing::{field, info_span, Span};

use crate::scheduler::BatchError;

/// Records batch results onto a span created by [`BatchSpan::new`].
pub trait SpanExt {
    /// Sets `status`; failures also set the `reason` label and `error.message`.
    fn record_outcome<T>(&self, outcome: &Result<T, BatchError>);

    fn record_latency(&self, elapsed: Duration);
}

impl SpanExt for Span {
    fn record_outcome<T>(&self, outcome: &Result<T, BatchError>) {
        let Err(failure) = outcome else {
            self.record("status", "ok");
            return;
        };
        self.record("status", "failed");
        self.record("reason", failure.reason());
        self.record("error.message", field::display(failure));
    }

    fn record_latency(&self, elapsed: Duration) {
        self.record("latency_ms", elapsed.as_millis() as u64);
    }
}

/// Factory for per-batch spans.
pub struct BatchSpan;

impl BatchSpan {
    /// Span named `batch_execute`. Outcome fields start empty.
    pub fn new(batch_size: usize) -> Span {
        info_span!(
            "batch_execute",
            batch_size,
            status = field::Empty,
            reason = field::Empty,
            error.message = field::Empty,
            latency_ms = field::Empty,
        )
    }
}
