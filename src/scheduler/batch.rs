//! Continuous batch extraction.
//!
//! Each pull purges expired entries, waits (bounded) for work, drains a
//! window of up to `batch_size * max_batches_per_pull` entries, sorts the
//! window by ordering hint so similarly-sized inputs share a batch, and
//! hands out `batch_size` slices one at a time through [`Batches`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use super::entry::QueueEntry;
use super::error::ContractViolation;
use super::purge::purge_expired;
use super::queue::OrderedQueue;
use super::work::{Output, Payload, WorkUnit};

/// Configuration for batch extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub max_batches_per_pull: usize,
    /// Upper bound on the wait for a non-empty queue.
    pub poll_timeout: Duration,
    /// Maximum queue residency. `None` or zero disables purging.
    pub residency_limit: Option<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_batches_per_pull: 4,
            poll_timeout: Duration::from_millis(200),
            residency_limit: None,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ContractViolation> {
        if self.batch_size == 0 {
            return Err(ContractViolation::ZeroBatchSize);
        }
        if self.max_batches_per_pull == 0 {
            return Err(ContractViolation::ZeroBatchesPerPull);
        }
        Ok(())
    }

    /// Entries drained per pull.
    pub fn window(&self) -> usize {
        self.batch_size.saturating_mul(self.max_batches_per_pull)
    }
}

/// Pulls batches out of an [`OrderedQueue`]. Meant for a single consumer.
pub struct BatchExtractor<P, R> {
    queue: Arc<OrderedQueue<P, R>>,
}

impl<P: Payload, R: Output> BatchExtractor<P, R> {
    pub fn new(queue: Arc<OrderedQueue<P, R>>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Arc<OrderedQueue<P, R>> {
        &self.queue
    }

    /// Pull the next window of batches using `config`.
    pub async fn pull(&self, config: &BatchConfig) -> Result<Batches<P, R>, ContractViolation> {
        self.next_batches(
            config.batch_size,
            config.max_batches_per_pull,
            config.poll_timeout,
            config.residency_limit,
        )
        .await
    }

    /// Purge, wait for work, drain and sort one window.
    ///
    /// An empty [`Batches`] means nothing became ready within `poll_timeout`.
    pub async fn next_batches(
        &self,
        batch_size: usize,
        max_batches_per_pull: usize,
        poll_timeout: Duration,
        residency_limit: Option<Duration>,
    ) -> Result<Batches<P, R>, ContractViolation> {
        if batch_size == 0 {
            return Err(ContractViolation::ZeroBatchSize);
        }
        if max_batches_per_pull == 0 {
            return Err(ContractViolation::ZeroBatchesPerPull);
        }

        purge_expired(&self.queue, residency_limit);

        if !self.queue.wait_nonempty(poll_timeout).await {
            return Ok(Batches::empty(batch_size));
        }

        // No await between the drain and the return: dropping this future
        // can never strand drained entries.
        let mut window = self
            .queue
            .drain_prefix(batch_size.saturating_mul(max_batches_per_pull));
        let drained = window.len();

        if window.len() > batch_size {
            window.sort_by_key(|entry| entry.priority_key);
        }
        window.retain(|entry| !entry.unit.is_completed());

        tracing::debug!(
            drained,
            ready = window.len(),
            batch_size,
            "drained batch window"
        );

        Ok(Batches {
            queue: Some(Arc::clone(&self.queue)),
            remaining: window.into(),
            batch_size,
        })
    }
}

/// Lazily sliced batches from one drained window.
///
/// Dropping a partially consumed `Batches` puts the unyielded entries back
/// at the front of the queue with their original admission time.
pub struct Batches<P, R> {
    queue: Option<Arc<OrderedQueue<P, R>>>,
    remaining: VecDeque<QueueEntry<P, R>>,
    batch_size: usize,
}

impl<P, R> Batches<P, R> {
    fn empty(batch_size: usize) -> Self {
        Self {
            queue: None,
            remaining: VecDeque::new(),
            batch_size,
        }
    }

    /// Entries not yet yielded.
    pub fn remaining_units(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }
}

impl<P, R> Iterator for Batches<P, R> {
    type Item = Vec<WorkUnit<P, R>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        let take = self.batch_size.min(self.remaining.len());
        Some(self.remaining.drain(..take).map(|entry| entry.unit).collect())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining.len().div_ceil(self.batch_size);
        (n, Some(n))
    }
}

impl<P, R> ExactSizeIterator for Batches<P, R> {}

impl<P, R> Drop for Batches<P, R> {
    fn drop(&mut self) {
        if self.remaining.is_empty() {
            return;
        }
        if let Some(queue) = self.queue.take() {
            let leftover: Vec<_> = self.remaining.drain(..).collect();
            tracing::debug!(requeued = leftover.len(), "requeueing unconsumed batch entries");
            queue.requeue_front(leftover);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::work::ResultHandle;

    fn fill(q: &OrderedQueue<String, usize>, texts: &[&str]) -> Vec<ResultHandle<String, usize>> {
        let (units, handles): (Vec<_>, Vec<_>) = texts
            .iter()
            .enumerate()
            .map(|(i, t)| WorkUnit::new(i as u64, t.to_string()))
            .unzip();
        q.push(units);
        handles
    }

    fn texts(batch: &[WorkUnit<String, usize>]) -> Vec<String> {
        batch.iter().map(|u| u.content().to_string()).collect()
    }

    #[test]
    fn config_rejects_zero_sizes() {
        let mut config = BatchConfig { batch_size: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ContractViolation::ZeroBatchSize));
        config.batch_size = 4;
        config.max_batches_per_pull = 0;
        assert_eq!(config.validate(), Err(ContractViolation::ZeroBatchesPerPull));
    }

    #[tokio::test]
    async fn sorts_window_then_slices() {
        let q: Arc<OrderedQueue<String, usize>> = Arc::new(OrderedQueue::new());
        let _handles = fill(&q, &["aaaaa", "a", "aaaaaaaaa", "aa"]);
        let extractor = BatchExtractor::new(Arc::clone(&q));

        let batches: Vec<_> = extractor
            .next_batches(2, 2, Duration::from_millis(10), None)
            .await
            .unwrap()
            .collect();

        assert_eq!(batches.len(), 2);
        assert_eq!(texts(&batches[0]), vec!["a", "aa"]);
        assert_eq!(texts(&batches[1]), vec!["aaaaa", "aaaaaaaaa"]);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn single_batch_window_keeps_arrival_order() {
        let q: Arc<OrderedQueue<String, usize>> = Arc::new(OrderedQueue::new());
        let _handles = fill(&q, &["ccc", "a", "bb"]);
        let extractor = BatchExtractor::new(Arc::clone(&q));

        let mut batches = extractor
            .next_batches(3, 1, Duration::from_millis(10), None)
            .await
            .unwrap();
        let first = batches.next().unwrap();
        assert_eq!(texts(&first), vec!["ccc", "a", "bb"]);
        assert!(batches.next().is_none());
    }

    #[tokio::test]
    async fn abandoned_batches_are_requeued_in_front() {
        let q: Arc<OrderedQueue<String, usize>> = Arc::new(OrderedQueue::new());
        let _handles = fill(&q, &["a", "b", "c", "d", "e"]);
        let extractor = BatchExtractor::new(Arc::clone(&q));

        let mut batches = extractor
            .next_batches(2, 2, Duration::from_millis(10), None)
            .await
            .unwrap();
        assert_eq!(batches.len(), 2);
        let first = batches.next().unwrap();
        assert_eq!(first.len(), 2);
        drop(batches);

        let order: Vec<String> = q
            .drain_prefix(10)
            .iter()
            .map(|e| e.unit.content().to_string())
            .collect();
        assert_eq!(order, vec!["c", "d", "e"]);
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let q: Arc<OrderedQueue<String, usize>> = Arc::new(OrderedQueue::new());
        let extractor = BatchExtractor::new(q);
        let err = extractor
            .next_batches(0, 1, Duration::from_millis(1), None)
            .await
            .err();
        assert_eq!(err, Some(ContractViolation::ZeroBatchSize));
    }
}
