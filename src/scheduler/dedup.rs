//! Request deduplication via output caching.
//!
//! Caches outputs for identical payloads within a TTL window
//! to avoid redundant batch computation.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::bridge::ResultCache;
use super::work::{Output, Payload};

/// Cached output for a completed request.
#[derive(Debug, Clone)]
pub struct CachedOutput<R> {
    pub value: R,
    pub cached_at: Instant,
}

/// Configuration for output cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputCacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for OutputCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 10_000,
        }
    }
}

/// In-memory output cache keyed by payload fingerprint.
pub struct OutputCache<R> {
    entries: DashMap<[u8; 32], CachedOutput<R>>,
    ttl: Duration,
    max_entries: usize,
}

impl<R: Output> OutputCache<R> {
    pub fn new(config: OutputCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: config.ttl,
            max_entries: config.max_entries.max(1),
        }
    }

    /// Get cached output if within TTL.
    pub fn get(&self, key: &[u8; 32]) -> Option<R> {
        let entry = self.entries.get(key)?;
        if entry.cached_at.elapsed() <= self.ttl {
            Some(entry.value.clone())
        } else {
            None // Expired
        }
    }

    /// Store output for future dedup.
    pub fn insert(&self, key: [u8; 32], value: R) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_oldest();
        }
        self.entries.insert(key, CachedOutput {
            value,
            cached_at: Instant::now(),
        });
    }

    /// Remove expired entries.
    pub fn cleanup(&self) {
        self.entries.retain(|_, entry| entry.cached_at.elapsed() <= self.ttl);
    }

    /// Number of entries in cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&self) {
        if let Some(oldest_key) = self.find_oldest_key() {
            self.entries.remove(&oldest_key);
        }
    }

    fn find_oldest_key(&self) -> Option<[u8; 32]> {
        self.entries
            .iter()
            .min_by_key(|entry| entry.value().cached_at)
            .map(|entry| *entry.key())
    }
}

#[async_trait]
impl<P: Payload, R: Output> ResultCache<P, R> for OutputCache<R> {
    async fn try_get(&self, content: &P) -> Option<R> {
        self.get(&content.cache_key())
    }

    async fn put(&self, content: &P, value: R) {
        let key = content.cache_key();
        tracing::trace!(key = %hex::encode(&key[..8]), "caching batch output");
        self.insert(key, value);
    }
}
