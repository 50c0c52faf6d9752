//! Ordered queue store shared by producers and the batch consumer.
//!
//! Entries live in a mutex-guarded deque in insertion order. A `signaled`
//! flag mirrors "non-empty" and is only changed under the same lock, so the
//! flag and the deque length never disagree. Waiters register with the
//! [`Notify`] before checking the deque, which rules out lost wakeups.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;

use super::entry::QueueEntry;
use super::work::{Output, Payload, WorkUnit};
use crate::telemetry;

struct QueueState<P, R> {
    entries: VecDeque<QueueEntry<P, R>>,
    signaled: bool,
    next_sequence: u64,
}

impl<P, R> QueueState<P, R> {
    /// Clear the signal when the deque became empty.
    fn sync_signal(&mut self) {
        if self.entries.is_empty() {
            self.signaled = false;
        }
    }
}

/// Thread-safe ordered store of queue entries.
pub struct OrderedQueue<P, R> {
    state: Mutex<QueueState<P, R>>,
    notify: Notify,
}

impl<P, R> OrderedQueue<P, R> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                entries: VecDeque::new(),
                signaled: false,
                next_sequence: 0,
            }),
            notify: Notify::new(),
        }
    }

    /// Advisory snapshot of the number of queued entries.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Current state of the non-empty signal.
    pub fn is_signaled(&self) -> bool {
        self.state.lock().signaled
    }

    /// Remove and return up to `max_count` entries from the front.
    pub fn drain_prefix(&self, max_count: usize) -> Vec<QueueEntry<P, R>> {
        let (drained, remaining) = {
            let mut state = self.state.lock();
            let take = max_count.min(state.entries.len());
            let drained: Vec<_> = state.entries.drain(..take).collect();
            state.sync_signal();
            (drained, state.entries.len())
        };
        telemetry::record_queue_depth(remaining);
        drained
    }

    /// Remove every entry.
    pub fn drain_all(&self) -> Vec<QueueEntry<P, R>> {
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            let drained = state.entries.drain(..).collect();
            state.sync_signal();
            drained
        };
        telemetry::record_queue_depth(0);
        drained
    }

    /// Put drained entries back at the front, keeping their relative order
    /// and original admission data.
    pub(crate) fn requeue_front(&self, entries: Vec<QueueEntry<P, R>>) {
        if entries.is_empty() {
            return;
        }
        let len = {
            let mut state = self.state.lock();
            for entry in entries.into_iter().rev() {
                state.entries.push_front(entry);
            }
            state.signaled = true;
            state.entries.len()
        };
        telemetry::record_queue_depth(len);
        self.notify.notify_waiters();
    }

    /// Run `f` with exclusive access to the entries, then resync the signal.
    pub(crate) fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut VecDeque<QueueEntry<P, R>>) -> T,
    ) -> T {
        let (out, len) = {
            let mut state = self.state.lock();
            let out = f(&mut state.entries);
            state.sync_signal();
            (out, state.entries.len())
        };
        telemetry::record_queue_depth(len);
        out
    }

    /// Wait up to `timeout` for the queue to hold at least one entry.
    ///
    /// Returns false if it is still empty when the wait elapses.
    pub async fn wait_nonempty(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_signaled() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.is_signaled();
            }
        }
    }
}

impl<P: Payload, R: Output> OrderedQueue<P, R> {
    /// Append all units atomically and raise the non-empty signal.
    ///
    /// Returns the queue length right after the insert.
    pub fn push(&self, units: Vec<WorkUnit<P, R>>) -> usize {
        if units.is_empty() {
            return self.len();
        }
        let len = {
            let mut state = self.state.lock();
            for unit in units {
                let sequence = state.next_sequence;
                state.next_sequence += 1;
                state.entries.push_back(QueueEntry::new(unit, sequence));
            }
            state.signaled = true;
            state.entries.len()
        };
        telemetry::record_queue_depth(len);
        self.notify.notify_waiters();
        len
    }
}

impl<P, R> Default for OrderedQueue<P, R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
