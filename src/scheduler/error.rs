//! Error types for the batching core.
//!
//! Per-request failures travel through result slots as [`BatchError`].
//! Only malformed calls surface synchronously.

use thiserror::Error;

/// Failure delivered to a caller through its result slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("request waited {waited_ms}ms in queue, exceeding the residency limit of {limit_ms}ms")]
    Timeout { waited_ms: u64, limit_ms: u64 },

    #[error("compute backend failed: {0}")]
    Upstream(String),

    #[error("request cancelled by caller")]
    Cancelled,

    #[error("batch queue shut down before the request was processed")]
    ShutDown,

    #[error("request was dropped before it was processed")]
    Abandoned,
}

impl BatchError {
    /// Short label used for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Upstream(_) => "upstream",
            Self::Cancelled => "cancelled",
            Self::ShutDown => "shutdown",
            Self::Abandoned => "abandoned",
        }
    }
}

/// Invalid parameters passed at configuration or call time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("batch size must be greater than zero")]
    ZeroBatchSize,

    #[error("max batches per pull must be greater than zero")]
    ZeroBatchesPerPull,

    #[error("max queue size must be greater than zero")]
    ZeroQueueSize,
}

/// Admission rejections returned by the submission interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("request queue is full: {current}/{max} pending requests")]
    QueueFull { current: usize, max: usize },

    #[error("batch queue is shutting down")]
    ShuttingDown,
}

/// Errors reported by a compute backend for a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("batch execution failed: {0}")]
    Execution(String),

    #[error("backend returned {actual} results for a batch of {expected}")]
    ResultCountMismatch { expected: usize, actual: usize },
}

/// Error returned by the submit-and-await convenience path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error(transparent)]
    Rejected(#[from] QueueError),

    #[error(transparent)]
    Failed(#[from] BatchError),
}

impl RequestError {
    /// Returns true if the request timed out while queued.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Failed(BatchError::Timeout { .. }))
    }
}
