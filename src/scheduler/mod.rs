//! Dynamic batching core.
//!
//! Manages the ordered request queue, residency timeouts, continuous batch
//! extraction, the result bridge with its optional cache, and the single
//! consumer loop feeding the compute backend.

mod batch;
mod bridge;
mod dedup;
mod entry;
mod error;
mod handler;
mod purge;
mod queue;
mod work;
mod worker;

pub use batch::{BatchConfig, BatchExtractor, Batches};
pub use bridge::{ResultBridge, ResultCache};
pub use dedup::{CachedOutput, OutputCache, OutputCacheConfig};
pub use entry::QueueEntry;
pub use error::{BackendError, BatchError, ContractViolation, QueueError, RequestError};
pub use handler::{BatchHandler, HandlerConfig};
pub use purge::purge_expired;
pub use queue::OrderedQueue;
pub use work::{Outcome, Output, Payload, ResultHandle, ResultSlot, WorkUnit};
pub use worker::{execute_batch, spawn_worker, ComputeBackend};

pub(crate) use worker::fail_leftovers;
