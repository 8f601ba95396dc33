//! 结果缓存模块：以内容寻址方式缓存分析结果，避免重复计算。
//!
//! # Result Cache Module
//!
//! Content-addressed, bounded storage of previously computed analysis results.
//! A repeated `(task_type, input)` submission is answered from here without
//! ever entering a batch.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResultCache`] | Fail-open cache manager with hit/miss statistics |
//! | [`CacheConfig`] | Enable flag and optional entry TTL |
//! | [`CacheBackend`] | Trait for implementing custom cache backends |
//! | [`MemoryCache`] | In-memory LRU cache implementation |
//! | [`NullCache`] | No-op cache for disabling caching |
//! | [`CacheKey`] | Task type plus sha256 of the normalized input |
//!
//! ## Example
//!
//! ```rust
//! use analysis_scheduler::cache::{CacheConfig, MemoryCache, ResultCache};
//!
//! let cache = ResultCache::new(CacheConfig::new(), Box::new(MemoryCache::new(1000)));
//! assert!(cache.is_enabled());
//! ```
//!
//! ## Normalization
//!
//! Inputs are trimmed and runs of whitespace collapse to one space before
//! hashing, so `"good  movie"` and `" good movie "` share an entry.

mod backend;
mod key;
mod manager;

pub use backend::{CacheBackend, MemoryCache, NullCache};
pub use key::{CacheKey, CacheKeyGenerator};
pub use manager::{CacheConfig, CacheStats, ResultCache};
