//! Tests for queue ordering, batch extraction, and completion guarantees.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gg_batch::scheduler::{
    execute_batch, spawn_worker, BackendError, BatchConfig, BatchError, BatchExtractor,
    ComputeBackend, OrderedQueue, ResultHandle, WorkUnit,
};
use rand::Rng;
use tokio_util::sync::CancellationToken;

type Queue = OrderedQueue<String, usize>;

fn push_texts(queue: &Queue, texts: &[String]) -> Vec<ResultHandle<String, usize>> {
    let (units, handles): (Vec<_>, Vec<_>) = texts
        .iter()
        .enumerate()
        .map(|(i, t)| WorkUnit::new(i as u64, t.clone()))
        .unzip();
    queue.push(units);
    handles
}

fn sized(lengths: &[usize]) -> Vec<String> {
    lengths.iter().map(|n| "x".repeat(*n)).collect()
}

struct EchoLen;

#[async_trait]
impl ComputeBackend<String, usize> for EchoLen {
    async fn execute(&self, batch: &[Arc<String>]) -> Result<Vec<usize>, BackendError> {
        Ok(batch.iter().map(|s| s.len()).collect())
    }
}

#[tokio::test]
async fn sorted_window_yields_size_local_batches() {
    let queue = Arc::new(Queue::new());
    let _handles = push_texts(&queue, &sized(&[5, 1, 9, 2]));
    let extractor = BatchExtractor::new(Arc::clone(&queue));

    let batches: Vec<Vec<usize>> = extractor
        .next_batches(2, 2, Duration::from_millis(10), None)
        .await
        .unwrap()
        .map(|batch| batch.iter().map(|u| u.content().len()).collect())
        .collect();

    assert_eq!(batches, vec![vec![1, 2], vec![5, 9]]);
}

#[tokio::test]
async fn equal_hints_keep_arrival_order() {
    let queue = Arc::new(Queue::new());
    let texts: Vec<String> = vec!["bb", "aa", "cc", "dd", "e"].into_iter().map(String::from).collect();
    let _handles = push_texts(&queue, &texts);
    let extractor = BatchExtractor::new(Arc::clone(&queue));

    let flat: Vec<String> = extractor
        .next_batches(2, 4, Duration::from_millis(10), None)
        .await
        .unwrap()
        .flatten()
        .map(|u| u.content().to_string())
        .collect();

    assert_eq!(flat, vec!["e", "bb", "aa", "cc", "dd"]);
}

#[tokio::test]
async fn every_batch_respects_size_bound() {
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let batch_size = rng.gen_range(1..=8);
        let per_pull = rng.gen_range(1..=4);
        let count = rng.gen_range(0..=60);
        let lengths: Vec<usize> = (0..count).map(|_| rng.gen_range(1..=40)).collect();

        let queue = Arc::new(Queue::new());
        let _handles = push_texts(&queue, &sized(&lengths));
        let extractor = BatchExtractor::new(Arc::clone(&queue));

        let mut seen = 0;
        while !queue.is_empty() {
            let batches = extractor
                .next_batches(batch_size, per_pull, Duration::from_millis(1), None)
                .await
                .unwrap();
            let mut pulled = 0;
            for batch in batches {
                assert!(!batch.is_empty());
                assert!(batch.len() <= batch_size);
                pulled += batch.len();
            }
            assert!(pulled <= batch_size * per_pull);
            seen += pulled;
        }
        assert_eq!(seen, count);
    }
}

#[tokio::test]
async fn drained_completed_entries_leave_the_store() {
    let queue = Arc::new(Queue::new());
    let handles = push_texts(&queue, &sized(&[1, 2, 3]));
    for h in &handles {
        h.cancel();
    }
    let extractor = BatchExtractor::new(Arc::clone(&queue));

    let batches = extractor
        .next_batches(2, 2, Duration::from_millis(10), None)
        .await
        .unwrap();
    assert_eq!(batches.count(), 0);
    assert!(queue.is_empty());
    assert!(!queue.is_signaled());
}

#[tokio::test]
async fn earlier_entries_are_never_drained_after_later_ones() {
    let queue = Arc::new(Queue::new());
    let _first = push_texts(&queue, &sized(&[30, 30, 30]));
    let extractor = BatchExtractor::new(Arc::clone(&queue));

    let _second = push_texts(&queue, &sized(&[1, 1, 1]));
    let window: Vec<usize> = extractor
        .next_batches(3, 1, Duration::from_millis(10), None)
        .await
        .unwrap()
        .flatten()
        .map(|u| u.content().len())
        .collect();

    assert_eq!(window, vec![30, 30, 30]);
}

#[tokio::test]
async fn racing_completions_settle_exactly_once() {
    for _ in 0..20 {
        let queue = Arc::new(Queue::new());
        let handles = push_texts(&queue, &sized(&[3, 1, 2, 4, 5, 6]));
        let extractor = BatchExtractor::new(Arc::clone(&queue));
        let batches = extractor
            .next_batches(3, 2, Duration::from_millis(10), None)
            .await
            .unwrap();

        let cancellers: Vec<_> = handles
            .iter()
            .map(|h| {
                let slot = h.slot().clone();
                tokio::spawn(async move { slot.complete(Err(BatchError::Cancelled)) })
            })
            .collect();
        for batch in batches {
            execute_batch(batch, &EchoLen).await;
        }
        for c in cancellers {
            c.await.unwrap();
        }

        for h in &handles {
            let first = h.slot().peek().expect("slot settled");
            assert!(!h.slot().complete(Ok(0)));
            assert_eq!(h.slot().peek(), Some(first));
        }
    }
}

#[tokio::test]
async fn concurrent_producers_all_complete() {
    let queue = Arc::new(Queue::new());
    let shutdown = CancellationToken::new();
    let config = BatchConfig {
        batch_size: 4,
        max_batches_per_pull: 3,
        poll_timeout: Duration::from_millis(10),
        residency_limit: None,
    };
    let worker = spawn_worker(
        BatchExtractor::new(Arc::clone(&queue)),
        Arc::new(EchoLen),
        config,
        shutdown.clone(),
    );

    let producers: Vec<_> = (0..10)
        .map(|p| {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let mut results = Vec::new();
                for i in 0..20usize {
                    let text = "y".repeat(1 + (p * 7 + i) % 13);
                    let (unit, handle) = WorkUnit::new((p * 100 + i) as u64, text.clone());
                    queue.push(vec![unit]);
                    results.push((text.len(), handle));
                }
                for (expected, handle) in results {
                    let got = tokio::time::timeout(Duration::from_secs(2), handle.wait())
                        .await
                        .unwrap();
                    assert_eq!(got, Ok(expected));
                }
            })
        })
        .collect();

    for p in producers {
        p.await.unwrap();
    }
    assert!(queue.is_empty());

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), worker)
        .await
        .unwrap()
        .unwrap();
}
