//! Telemetry for the batching runtime.
//!
//! Structured logging, per-batch tracing spans, and metrics recorded
//! through the `metrics` facade.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_batch, record_cache_hits, record_purged, record_queue_depth, record_request_failure,
};
pub use spans::{BatchSpan, SpanExt};
