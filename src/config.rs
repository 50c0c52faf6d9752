//! Runtime configuration loading from environment variables or TOML.
//!
//! Values are read once at startup and passed into the runtime as a
//! [`RuntimeConfig`](crate::RuntimeConfig); the batching core itself never
//! reads the environment. Invalid values fall back to defaults without
//! crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `GG_BATCH_SIZE` | 32 | Max work units per batch |
//! | `GG_BATCH_MAX_BATCHES_PER_PULL` | 4 | Batches drained and sorted per pull |
//! | `GG_BATCH_POLL_TIMEOUT_MS` | 200 | Max wait for a non-empty queue (ms) |
//! | `GG_BATCH_QUEUE_TIMEOUT_MS` | 0 | Max queue residency (ms), 0 disables |
//! | `GG_BATCH_MAX_QUEUE_SIZE` | 32000 | Pending units before admission rejects |
//! | `GG_BATCH_CACHE_ENABLED` | false | Enable the in-memory result cache |
//! | `GG_BATCH_CACHE_TTL` | 300 | Result cache TTL (secs) |
//! | `GG_BATCH_CACHE_MAX_ENTRIES` | 10000 | Result cache capacity |
//! | `GG_BATCH_SHUTDOWN_TIMEOUT` | 30 | Graceful drain timeout (secs) |

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::scheduler::{BatchConfig, HandlerConfig, OutputCacheConfig};
use crate::RuntimeConfig;

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub batch_size: usize,
    pub max_batches_per_pull: usize,
    pub poll_timeout_ms: u64,
    pub queue_timeout_ms: u64,
    pub max_queue_size: usize,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
    pub shutdown_timeout_secs: u64,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_batches_per_pull: 4,
            poll_timeout_ms: 200,
            queue_timeout_ms: 0,
            max_queue_size: 32_000,
            cache_enabled: false,
            cache_ttl_secs: 300,
            cache_max_entries: 10_000,
            shutdown_timeout_secs: 30,
        }
    }
}

/// Errors from parsing a TOML config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse a numeric value, returning `default` on missing or invalid.
fn parse_num<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim) {
        Some("1") | Some("true") | Some("TRUE") | Some("yes") => true,
        Some("0") | Some("false") | Some("FALSE") | Some("no") => false,
        _ => default,
    }
}

/// Load configuration from process environment variables.
pub fn load() -> RuntimeConfig {
    load_with(|key| std::env::var(key).ok())
}

/// Load configuration through `lookup`, which maps a variable name to its value.
pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> RuntimeConfig {
    let d = EffectiveConfig::default();
    let effective = EffectiveConfig {
        batch_size: parse_num(lookup("GG_BATCH_SIZE"), d.batch_size),
        max_batches_per_pull: parse_num(
            lookup("GG_BATCH_MAX_BATCHES_PER_PULL"),
            d.max_batches_per_pull,
        ),
        poll_timeout_ms: parse_num(lookup("GG_BATCH_POLL_TIMEOUT_MS"), d.poll_timeout_ms),
        queue_timeout_ms: parse_num(lookup("GG_BATCH_QUEUE_TIMEOUT_MS"), d.queue_timeout_ms),
        max_queue_size: parse_num(lookup("GG_BATCH_MAX_QUEUE_SIZE"), d.max_queue_size),
        cache_enabled: parse_bool(lookup("GG_BATCH_CACHE_ENABLED"), d.cache_enabled),
        cache_ttl_secs: parse_num(lookup("GG_BATCH_CACHE_TTL"), d.cache_ttl_secs),
        cache_max_entries: parse_num(lookup("GG_BATCH_CACHE_MAX_ENTRIES"), d.cache_max_entries),
        shutdown_timeout_secs: parse_num(
            lookup("GG_BATCH_SHUTDOWN_TIMEOUT"),
            d.shutdown_timeout_secs,
        ),
    };
    effective.into_runtime_config()
}

/// Parse a TOML document with the same keys as [`EffectiveConfig`].
///
/// Missing keys take their defaults.
pub fn from_toml_str(source: &str) -> Result<RuntimeConfig, ConfigError> {
    let file: FileConfig = toml::from_str(source)?;
    Ok(file.merge().into_runtime_config())
}

/// Read and parse a TOML config file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<RuntimeConfig, ConfigError> {
    let source = std::fs::read_to_string(path)?;
    from_toml_str(&source)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    batch_size: Option<usize>,
    max_batches_per_pull: Option<usize>,
    poll_timeout_ms: Option<u64>,
    queue_timeout_ms: Option<u64>,
    max_queue_size: Option<usize>,
    cache_enabled: Option<bool>,
    cache_ttl_secs: Option<u64>,
    cache_max_entries: Option<usize>,
    shutdown_timeout_secs: Option<u64>,
}

impl FileConfig {
    fn merge(self) -> EffectiveConfig {
        let d = EffectiveConfig::default();
        EffectiveConfig {
            batch_size: self.batch_size.unwrap_or(d.batch_size),
            max_batches_per_pull: self.max_batches_per_pull.unwrap_or(d.max_batches_per_pull),
            poll_timeout_ms: self.poll_timeout_ms.unwrap_or(d.poll_timeout_ms),
            queue_timeout_ms: self.queue_timeout_ms.unwrap_or(d.queue_timeout_ms),
            max_queue_size: self.max_queue_size.unwrap_or(d.max_queue_size),
            cache_enabled: self.cache_enabled.unwrap_or(d.cache_enabled),
            cache_ttl_secs: self.cache_ttl_secs.unwrap_or(d.cache_ttl_secs),
            cache_max_entries: self.cache_max_entries.unwrap_or(d.cache_max_entries),
            shutdown_timeout_secs: self.shutdown_timeout_secs.unwrap_or(d.shutdown_timeout_secs),
        }
    }
}

impl EffectiveConfig {
    /// Clamp to safe floors and build the runtime configuration.
    pub fn into_runtime_config(self) -> RuntimeConfig {
        let residency = Duration::from_millis(self.queue_timeout_ms);
        RuntimeConfig {
            batch: BatchConfig {
                batch_size: self.batch_size.max(1),
                max_batches_per_pull: self.max_batches_per_pull.max(1),
                poll_timeout: Duration::from_millis(self.poll_timeout_ms.max(1)),
                residency_limit: (!residency.is_zero()).then_some(residency),
            },
            handler: HandlerConfig {
                max_queue_size: self.max_queue_size.max(1),
            },
            cache: self.cache_enabled.then(|| OutputCacheConfig {
                ttl: Duration::from_secs(self.cache_ttl_secs.max(1)),
                max_entries: self.cache_max_entries.max(1),
            }),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs.max(1)),
        }
    }
}

impl RuntimeConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        let cache = self.cache.clone().unwrap_or_default();
        EffectiveConfig {
            batch_size: self.batch.batch_size,
            max_batches_per_pull: self.batch.max_batches_per_pull,
            poll_timeout_ms: self.batch.poll_timeout.as_millis() as u64,
            queue_timeout_ms: self
                .batch
                .residency_limit
                .map_or(0, |l| l.as_millis() as u64),
            max_queue_size: self.handler.max_queue_size,
            cache_enabled: self.cache.is_some(),
            cache_ttl_secs: cache.ttl.as_secs(),
            cache_max_entries: cache.max_entries,
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = load_with(|_| None);
        assert_eq!(config.effective_config(), EffectiveConfig::default());
        assert!(config.batch.residency_limit.is_none());
        assert!(config.cache.is_none());
    }

    #[test]
    fn queue_timeout_enables_purging() {
        let config = load_with(env(&[("GG_BATCH_QUEUE_TIMEOUT_MS", "1500")]));
        assert_eq!(config.batch.residency_limit, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = load_with(env(&[
            ("GG_BATCH_SIZE", "lots"),
            ("GG_BATCH_MAX_QUEUE_SIZE", "-3"),
            ("GG_BATCH_CACHE_ENABLED", "maybe"),
        ]));
        assert_eq!(config.batch.batch_size, 32);
        assert_eq!(config.handler.max_queue_size, 32_000);
        assert!(config.cache.is_none());
    }

    #[test]
    fn zero_sizes_are_clamped() {
        let config = load_with(env(&[
            ("GG_BATCH_SIZE", "0"),
            ("GG_BATCH_MAX_BATCHES_PER_PULL", "0"),
        ]));
        assert_eq!(config.batch.batch_size, 1);
        assert_eq!(config.batch.max_batches_per_pull, 1);
        assert!(config.batch.validate().is_ok());
    }

    #[test]
    fn toml_overrides_selected_keys() {
        let config = from_toml_str(
            r#"
            batch_size = 8
            queue_timeout_ms = 250
            cache_enabled = true
            cache_max_entries = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.batch.batch_size, 8);
        assert_eq!(config.batch.max_batches_per_pull, 4);
        assert_eq!(config.batch.residency_limit, Some(Duration::from_millis(250)));
        assert_eq!(config.cache.map(|c| c.max_entries), Some(64));
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        assert!(from_toml_str("batch_sise = 3").is_err());
    }
}
