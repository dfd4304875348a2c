//! Planity response cache.
//!
//! A Redis-backed read-through cache for the JSON API:
//!
//! - **Store adapter** ([`CacheStore`]): fail-soft get/set/delete over a
//!   [`CacheBackend`]; an unreachable backend degrades to misses.
//! - **Key policy** ([`CacheKey`]): deterministic keys from method, path and
//!   normalized query, grouped into [`CacheNamespace`]s.
//! - **Read-through middleware** ([`response_cache_layer`]): serves GET
//!   responses from the cache and stores fresh 2xx JSON bodies.
//! - **Invalidation hook** ([`CacheInvalidator`]): drops namespaces after a
//!   successful write.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! url = "redis://localhost:6379"
//! default_ttl_seconds = 300
//! # ... see config.rs for all options
//! ```

pub mod backend;
mod config;
mod error;
mod invalidator;
mod keys;
mod lock;
mod middleware;
mod store;
mod supervisor;

pub use backend::{CacheBackend, MemoryBackend, RedisBackend, redact_url};
pub use config::{CacheBackendKind, CacheConfig, DEFAULT_CACHE_URL};
pub use error::{CacheError, CacheResult};
pub use invalidator::CacheInvalidator;
pub use keys::{CacheKey, CacheNamespace, KEY_PREFIX, SCOPE_PARAM, normalize_path, normalize_query};
pub use middleware::{
    CacheScope, CacheState, CachedResponse, response_cache_layer, should_store_response,
};
pub use store::{CacheHealth, CacheOutcome, CacheStore, ConnectionState};
pub use supervisor::spawn_reconnect_supervisor;

pub const METRIC_CACHE_HIT: &str = "planity_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "planity_cache_miss_total";
pub const METRIC_CACHE_STORE: &str = "planity_cache_store_total";
pub const METRIC_CACHE_ERROR: &str = "planity_cache_error_total";
pub const METRIC_CACHE_INVALIDATE: &str = "planity_cache_invalidate_total";
pub const METRIC_CACHE_EVICT: &str = "planity_cache_evict_total";
