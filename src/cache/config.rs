//! Cache configuration.
//!
//! Resolved from the `[cache]` section of `planity.toml` (see `crate::config`).

use std::num::NonZeroUsize;
use std::time::Duration;

// Default values for cache configuration
pub const DEFAULT_CACHE_URL: &str = "redis://localhost:6379";
const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_DASHBOARD_TTL_SECS: u64 = 60;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 50;
const DEFAULT_INVALIDATION_TIMEOUT_MS: u64 = 500;
const DEFAULT_CONNECT_RETRIES: u32 = 3;
const DEFAULT_CONNECT_BACKOFF_MS: u64 = 250;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;
const DEFAULT_RECONNECT_INTERVAL_SECS: u64 = 30;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
const DEFAULT_MEMORY_MAX_ENTRIES: usize = 10_000;

/// Which key-value store backs the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    Redis,
    /// Process-local store; useful for development and tests.
    Memory,
}

impl CacheBackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }
}

impl std::str::FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown cache backend `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Serve and populate cached responses.
    pub enabled: bool,
    /// Refuse to start when the backend is unreachable.
    pub required: bool,
    pub backend: CacheBackendKind,
    pub url: String,
    /// TTL applied to cached GET responses unless a route overrides it.
    pub default_ttl: Duration,
    /// TTL for dashboard statistics, which go stale faster than lists.
    pub dashboard_ttl: Duration,
    /// Upper bound on `get` / `set` round trips.
    pub operation_timeout: Duration,
    /// Upper bound on prefix deletion and flush.
    pub invalidation_timeout: Duration,
    pub connect_retries: u32,
    pub connect_backoff: Duration,
    pub connect_timeout: Duration,
    /// Delay between background reconnect attempts after a failed startup connect.
    pub reconnect_interval: Duration,
    /// Responses with larger bodies are passed through uncached.
    pub max_body_bytes: usize,
    /// Capacity of the in-memory backend; least recently used keys go first.
    pub memory_max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: false,
            backend: CacheBackendKind::Redis,
            url: DEFAULT_CACHE_URL.to_string(),
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            dashboard_ttl: Duration::from_secs(DEFAULT_DASHBOARD_TTL_SECS),
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
            invalidation_timeout: Duration::from_millis(DEFAULT_INVALIDATION_TIMEOUT_MS),
            connect_retries: DEFAULT_CONNECT_RETRIES,
            connect_backoff: Duration::from_millis(DEFAULT_CONNECT_BACKOFF_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            reconnect_interval: Duration::from_secs(DEFAULT_RECONNECT_INTERVAL_SECS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            memory_max_entries: DEFAULT_MEMORY_MAX_ENTRIES,
        }
    }
}

impl CacheConfig {
    /// In-memory configuration with the standard timeouts.
    pub fn in_memory() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            ..Default::default()
        }
    }

    /// Returns true if responses should be cached at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn memory_max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert!(!config.required);
        assert_eq!(config.backend, CacheBackendKind::Redis);
        assert_eq!(config.url, "redis://localhost:6379");
        assert_eq!(config.default_ttl, Duration::from_secs(300));
        assert_eq!(config.dashboard_ttl, Duration::from_secs(60));
        assert_eq!(config.operation_timeout, Duration::from_millis(50));
        assert_eq!(config.invalidation_timeout, Duration::from_millis(500));
        assert_eq!(config.connect_retries, 3);
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert_eq!(config.memory_max_entries_non_zero().get(), 10_000);
    }

    #[test]
    fn backend_kind_parses_case_insensitively() {
        assert_eq!("Redis".parse::<CacheBackendKind>(), Ok(CacheBackendKind::Redis));
        assert_eq!(
            " memory ".parse::<CacheBackendKind>(),
            Ok(CacheBackendKind::Memory)
        );
        assert!("memcached".parse::<CacheBackendKind>().is_err());
    }

    #[test]
    fn in_memory_keeps_timeouts() {
        let config = CacheConfig::in_memory();
        assert_eq!(config.backend, CacheBackendKind::Memory);
        assert_eq!(config.operation_timeout, Duration::from_millis(50));
    }
}
