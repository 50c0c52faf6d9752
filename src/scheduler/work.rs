//! Work units and their single-assignment result slots.

use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::sync::Notify;

use super::error::BatchError;
use crate::shutdown::ShutdownGuard;
use crate::telemetry;

/// Input carried by a work unit.
pub trait Payload: Send + Sync + 'static {
    /// Size hint used to group similarly-sized inputs into one batch.
    fn ordering_hint(&self) -> usize;

    /// Stable fingerprint used as the result cache key.
    fn cache_key(&self) -> [u8; 32];
}

impl Payload for String {
    fn ordering_hint(&self) -> usize {
        self.len()
    }

    fn cache_key(&self) -> [u8; 32] {
        Sha256::digest(self.as_bytes()).into()
    }
}

/// Value produced by the compute backend for one payload.
pub trait Output: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Output for T {}

/// Terminal state of a result slot.
pub type Outcome<R> = Result<R, BatchError>;

struct SlotInner<R> {
    completed: AtomicBool,
    outcome: OnceLock<Outcome<R>>,
    notify: Notify,
}

/// Shared single-assignment result cell.
///
/// The first call to [`complete`](Self::complete) wins; later calls return
/// `false` and change nothing.
pub struct ResultSlot<R> {
    inner: Arc<SlotInner<R>>,
}

impl<R> Clone for ResultSlot<R> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<R> std::fmt::Debug for ResultSlot<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSlot")
            .field("completed", &self.inner.completed.load(Ordering::Acquire))
            .finish()
    }
}

impl<R> ResultSlot<R> {
    /// Complete the slot. Returns false if it was already completed.
    pub fn complete(&self, outcome: Outcome<R>) -> bool {
        if self
            .inner
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        // Only the CAS winner reaches this point, so the cell is empty.
        let _ = self.inner.outcome.set(outcome);
        self.inner.notify.notify_waiters();
        true
    }

    /// Returns true once any completion has won.
    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::Acquire)
    }
}

impl<R: Output> ResultSlot<R> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SlotInner {
                completed: AtomicBool::new(false),
                outcome: OnceLock::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// Create a slot that is already completed with `value`.
    pub fn ready(value: R) -> Self {
        let slot = Self::new();
        slot.complete(Ok(value));
        slot
    }

    /// Snapshot of the outcome, if it has been stored.
    pub fn peek(&self) -> Option<Outcome<R>> {
        self.inner.outcome.get().cloned()
    }

    /// Wait for the slot to be completed.
    pub async fn wait(&self) -> Outcome<R> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a completion in between is not missed.
            notified.as_mut().enable();
            if let Some(outcome) = self.inner.outcome.get() {
                return outcome.clone();
            }
            notified.await;
        }
    }
}

impl<R: Output> Default for ResultSlot<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// One caller's request plus its pending result.
pub struct WorkUnit<P, R> {
    id: u64,
    content: Arc<P>,
    created_at: Instant,
    slot: ResultSlot<R>,
    _in_flight: Option<ShutdownGuard>,
}

impl<P, R> std::fmt::Debug for WorkUnit<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkUnit")
            .field("id", &self.id)
            .field("completed", &self.slot.inner.completed.load(Ordering::Acquire))
            .finish()
    }
}

// Pending units released without a result fail with `Abandoned`.
impl<P, R> Drop for WorkUnit<P, R> {
    fn drop(&mut self) {
        if self.slot.complete(Err(BatchError::Abandoned)) {
            tracing::warn!(id = self.id, "work unit dropped before completion");
            telemetry::record_request_failure(BatchError::Abandoned.reason());
        }
    }
}

impl<P: Payload, R: Output> WorkUnit<P, R> {
    /// Create a unit and the handle its caller will await.
    pub fn new(id: u64, content: P) -> (Self, ResultHandle<P, R>) {
        Self::with_guard(id, content, None)
    }

    pub(crate) fn with_guard(
        id: u64,
        content: P,
        guard: Option<ShutdownGuard>,
    ) -> (Self, ResultHandle<P, R>) {
        let content = Arc::new(content);
        let slot = ResultSlot::new();
        let handle = ResultHandle {
            id,
            content: Arc::clone(&content),
            slot: slot.clone(),
            from_cache: false,
            store_scheduled: AtomicBool::new(false),
        };
        let unit = Self {
            id,
            content,
            created_at: Instant::now(),
            slot,
            _in_flight: guard,
        };
        (unit, handle)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn content(&self) -> &Arc<P> {
        &self.content
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn ordering_hint(&self) -> usize {
        self.content.ordering_hint()
    }

    pub fn is_completed(&self) -> bool {
        self.slot.is_completed()
    }

    /// Complete this unit's result. Returns false if it was already completed.
    pub fn complete(&self, outcome: Outcome<R>) -> bool {
        self.slot.complete(outcome)
    }
}

/// Caller-side view of a submitted work unit.
pub struct ResultHandle<P, R> {
    id: u64,
    content: Arc<P>,
    slot: ResultSlot<R>,
    from_cache: bool,
    store_scheduled: AtomicBool,
}

impl<P, R> std::fmt::Debug for ResultHandle<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultHandle")
            .field("id", &self.id)
            .field("from_cache", &self.from_cache)
            .finish()
    }
}

impl<P: Payload, R: Output> ResultHandle<P, R> {
    /// Handle for a request answered from the result cache.
    pub(crate) fn cached(id: u64, content: P, value: R) -> Self {
        Self {
            id,
            content: Arc::new(content),
            slot: ResultSlot::ready(value),
            from_cache: true,
            store_scheduled: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn content(&self) -> &Arc<P> {
        &self.content
    }

    pub fn slot(&self) -> &ResultSlot<R> {
        &self.slot
    }

    /// True when the value came from the result cache.
    pub fn is_cached(&self) -> bool {
        self.from_cache
    }

    pub fn is_completed(&self) -> bool {
        self.slot.is_completed()
    }

    /// Claim the one cache store allowed per handle.
    pub(crate) fn claim_cache_store(&self) -> bool {
        !self.store_scheduled.swap(true, Ordering::AcqRel)
    }

    /// Give up on the request. No-op if it already completed.
    pub fn cancel(&self) -> bool {
        self.slot.complete(Err(BatchError::Cancelled))
    }

    /// Wait for the result.
    pub async fn wait(&self) -> Outcome<R> {
        self.slot.wait().await
    }
}
