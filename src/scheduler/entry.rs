//! Queue entries and their ordering.

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use super::work::{Output, Payload, WorkUnit};

/// A work unit as stored in the queue.
///
/// Entries order by `priority_key`, ties broken by insertion sequence.
pub struct QueueEntry<P, R> {
    pub unit: WorkUnit<P, R>,
    pub enqueued_at: Instant,
    pub priority_key: usize,
    pub(crate) sequence: u64,
}

impl<P: Payload, R: Output> QueueEntry<P, R> {
    pub(crate) fn new(unit: WorkUnit<P, R>, sequence: u64) -> Self {
        let priority_key = unit.ordering_hint();
        Self {
            unit,
            enqueued_at: Instant::now(),
            priority_key,
            sequence,
        }
    }

    /// Time spent in the queue as of `now`.
    pub fn residency(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.enqueued_at)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl<P, R> std::fmt::Debug for QueueEntry<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEntry")
            .field("unit", &self.unit)
            .field("priority_key", &self.priority_key)
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl<P, R> PartialEq for QueueEntry<P, R> {
    fn eq(&self, other: &Self) -> bool {
        self.priority_key == other.priority_key && self.sequence == other.sequence
    }
}

impl<P, R> Eq for QueueEntry<P, R> {}

impl<P, R> PartialOrd for QueueEntry<P, R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P, R> Ord for QueueEntry<P, R> {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority_key.cmp(&other.priority_key) {
            Ordering::Equal => self.sequence.cmp(&other.sequence),
            ord => ord,
        }
    }
}
