//! Proactive queue-residency timeout enforcement.
//!
//! Runs as a full scan right before extraction so a freshly drained window
//! is not shrunk by expired entries discovered mid-slice.

use std::time::{Duration, Instant};

use super::error::BatchError;
use super::queue::OrderedQueue;
use super::work::{Output, Payload};
use crate::telemetry;

/// Fail and remove every entry that has waited longer than `residency_limit`.
///
/// `None` or a zero limit disables enforcement. Entries whose result was
/// already completed elsewhere are discarded without being counted.
/// Returns the number of entries failed with a timeout.
pub fn purge_expired<P: Payload, R: Output>(
    queue: &OrderedQueue<P, R>,
    residency_limit: Option<Duration>,
) -> usize {
    let Some(limit) = residency_limit.filter(|l| !l.is_zero()) else {
        return 0;
    };

    let now = Instant::now();
    let limit_ms = limit.as_millis() as u64;
    let (purged, discarded) = queue.with_entries(|entries| {
        let mut purged = 0usize;
        let mut discarded = 0usize;
        entries.retain(|entry| {
            if entry.unit.is_completed() {
                discarded += 1;
                return false;
            }
            let waited = entry.residency(now);
            if waited <= limit {
                return true;
            }
            let failed = entry.unit.complete(Err(BatchError::Timeout {
                waited_ms: waited.as_millis() as u64,
                limit_ms,
            }));
            if failed {
                purged += 1;
            } else {
                discarded += 1;
            }
            false
        });
        (purged, discarded)
    });

    if discarded > 0 {
        tracing::debug!(discarded, "dropped already-completed queue entries");
    }
    if purged > 0 {
        tracing::warn!(purged, limit_ms, "purged queue entries past residency limit");
        telemetry::record_purged(purged, limit_ms);
    }
    purged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::work::WorkUnit;

    #[test]
    fn disabled_limit_is_noop() {
        let q: OrderedQueue<String, u32> = OrderedQueue::new();
        let (unit, handle) = WorkUnit::new(1, "a".into());
        q.push(vec![unit]);
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(purge_expired(&q, None), 0);
        assert_eq!(purge_expired(&q, Some(Duration::ZERO)), 0);
        assert_eq!(q.len(), 1);
        assert!(!handle.is_completed());
    }

    #[test]
    fn fresh_entries_are_kept_in_order() {
        let q: OrderedQueue<String, u32> = OrderedQueue::new();
        let (old, old_handle) = WorkUnit::new(1, "old".into());
        q.push(vec![old]);
        std::thread::sleep(Duration::from_millis(40));
        let (a, _ha) = WorkUnit::new(2, "a".into());
        let (b, _hb) = WorkUnit::new(3, "b".into());
        q.push(vec![a, b]);

        assert_eq!(purge_expired(&q, Some(Duration::from_millis(20))), 1);
        assert!(matches!(
            old_handle.slot().peek(),
            Some(Err(BatchError::Timeout { limit_ms: 20, .. }))
        ));
        let ids: Vec<u64> = q.drain_prefix(10).iter().map(|e| e.unit.id()).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn already_completed_entries_are_discarded_not_counted() {
        let q: OrderedQueue<String, u32> = OrderedQueue::new();
        let (unit, handle) = WorkUnit::new(1, "a".into());
        q.push(vec![unit]);
        assert!(handle.cancel());
        std::thread::sleep(Duration::from_millis(15));

        assert_eq!(purge_expired(&q, Some(Duration::from_millis(5))), 0);
        assert!(q.is_empty());
        assert!(!q.is_signaled());
        assert_eq!(handle.slot().peek(), Some(Err(BatchError::Cancelled)));
    }
}
