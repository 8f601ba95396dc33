//! Result cache manager.
//!
//! Every backend failure degrades to a miss; callers never see a cache error.

use super::backend::CacheBackend;
use super::key::{CacheKey, CacheKeyGenerator};
use crate::types::TaskType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self {
            enabled: true,
            ttl: None,
        }
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Content-addressed result cache in front of a [`CacheBackend`].
pub struct ResultCache {
    config: CacheConfig,
    keys: CacheKeyGenerator,
    backend: Box<dyn CacheBackend>,
    stats: AtomicStats,
}

impl ResultCache {
    pub fn new(config: CacheConfig, backend: Box<dyn CacheBackend>) -> Self {
        Self {
            config,
            keys: CacheKeyGenerator::new(),
            backend,
            stats: AtomicStats::default(),
        }
    }

    pub fn with_key_generator(mut self, keys: CacheKeyGenerator) -> Self {
        self.keys = keys;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn key_for(&self, task_type: TaskType, input: &str) -> CacheKey {
        self.keys.generate(task_type, input)
    }

    /// Look up a stored result. Returns `None` on miss, when disabled, or on any failure.
    pub async fn lookup(&self, task_type: TaskType, input: &str) -> Option<Value> {
        if !self.config.enabled {
            return None;
        }
        let key = self.key_for(task_type, input);
        match self.backend.get(&key).await {
            Ok(Some(data)) => match serde_json::from_slice(&data) {
                Ok(val) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    Some(val)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "discarding undecodable cache entry");
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    let _ = self.backend.delete(&key).await;
                    None
                }
            },
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "cache lookup failed; treating as miss");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a result. Failures are logged and counted, never returned.
    pub async fn store(&self, task_type: TaskType, input: &str, value: &Value) {
        if !self.config.enabled {
            return;
        }
        let key = self.key_for(task_type, input);
        let data = match serde_json::to_vec(value) {
            Ok(d) => d,
            Err(e) => {
                warn!(key = %key, error = %e, "result not serializable; skipping cache insert");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        match self.backend.set(&key, &data, self.config.ttl).await {
            Ok(()) => {
                self.stats.sets.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "cache insert failed");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Evict every entry. Returns the number removed (0 if the backend failed).
    pub async fn clear(&self) -> usize {
        match self.backend.clear().await {
            Ok(n) => n,
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "cache clear failed");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.backend.len().await.unwrap_or(0)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}
