//! Key-value backends behind the cache store adapter.

mod memory;
mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use self::memory::MemoryBackend;
pub use self::redis::{RedisBackend, redact_url};

use super::config::{CacheBackendKind, CacheConfig};
use super::error::CacheResult;

/// Raw key-value operations.
///
/// Implementations report every failure; the fail-soft policy lives in
/// [`CacheStore`](super::CacheStore), not here.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open the connection. Calling it on an open connection is a no-op.
    async fn connect(&self) -> CacheResult<()>;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Returns the number of keys removed.
    async fn delete(&self, key: &str) -> CacheResult<u64>;

    /// Remove every key starting with `prefix`; returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64>;

    async fn flush_all(&self) -> CacheResult<()>;

    async fn ping(&self) -> CacheResult<()>;

    /// Close the connection. Later operations fail with `NotConnected`.
    async fn quit(&self) -> CacheResult<()>;
}

/// Build the backend selected by configuration.
pub fn from_config(config: &CacheConfig) -> CacheResult<Arc<dyn CacheBackend>> {
    match config.backend {
        CacheBackendKind::Redis => Ok(Arc::new(RedisBackend::new(config)?)),
        CacheBackendKind::Memory => Ok(Arc::new(MemoryBackend::with_capacity(
            config.memory_max_entries_non_zero(),
        ))),
    }
}
