//! Process-local backend.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;

use super::CacheBackend;
use crate::cache::{CacheConfig, METRIC_CACHE_EVICT};
use crate::cache::error::{CacheError, CacheResult};
use crate::cache::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::backend::memory";
/// Every this many writes the whole map is scanned for expired entries.
const FULL_SWEEP_EVERY: u64 = 256;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Bounded TTL map with Redis-like connection semantics.
///
/// Holds at most `capacity` keys, evicting the least recently used. Expired
/// entries are dropped on read, from the LRU tail on every write, and by a
/// full sweep every [`FULL_SWEEP_EVERY`] writes. Uses the tokio clock, so
/// paused-time tests can advance past a TTL.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<LruCache<String, Entry>>,
    writes: AtomicU64,
    connected: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::with_capacity(CacheConfig::default().memory_max_entries_non_zero())
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            writes: AtomicU64::new(0),
            connected: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        rw_read(&self.entries, SOURCE, "capacity").cap().get()
    }

    /// Live (unexpired) entry count.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "len")
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries held in memory, including expired ones not yet swept.
    pub fn resident_len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "resident_len").len()
    }

    fn ensure_connected(&self) -> CacheResult<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CacheError::NotConnected)
        }
    }
}

fn sweep_tail(entries: &mut LruCache<String, Entry>, now: Instant) -> u64 {
    let mut swept = 0;
    while entries
        .peek_lru()
        .is_some_and(|(_, entry)| entry.is_expired(now))
    {
        entries.pop_lru();
        swept += 1;
    }
    swept
}

fn sweep_all(entries: &mut LruCache<String, Entry>, now: Instant) -> u64 {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| entry.is_expired(now))
        .map(|(key, _)| key.clone())
        .collect();
    for key in &expired {
        entries.pop(key);
    }
    expired.len() as u64
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> CacheResult<()> {
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.ensure_connected()?;
        let now = Instant::now();

        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
            drop(entries);
            counter!(METRIC_CACHE_EVICT, "reason" => "expired").increment(1);
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.ensure_connected()?;
        let now = Instant::now();
        let ttl = ttl.max(Duration::from_secs(1));
        let full_sweep = self.writes.fetch_add(1, Ordering::Relaxed) % FULL_SWEEP_EVERY
            == FULL_SWEEP_EVERY - 1;

        let mut entries = rw_write(&self.entries, SOURCE, "set_ex");
        let expired = if full_sweep {
            sweep_all(&mut entries, now)
        } else {
            sweep_tail(&mut entries, now)
        };

        let evicted = entries.push(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        drop(entries);

        if expired > 0 {
            counter!(METRIC_CACHE_EVICT, "reason" => "expired").increment(expired);
        }
        // `push` hands back the old value when the key was already present.
        if evicted.is_some_and(|(evicted_key, _)| evicted_key != key) {
            counter!(METRIC_CACHE_EVICT, "reason" => "capacity").increment(1);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<u64> {
        self.ensure_connected()?;
        let now = Instant::now();
        Ok(
            match rw_write(&self.entries, SOURCE, "delete").pop(key) {
                Some(entry) if !entry.is_expired(now) => 1,
                _ => 0,
            },
        )
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        self.ensure_connected()?;
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "delete_prefix");
        let matching: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();

        let mut deleted = 0u64;
        for key in &matching {
            if entries.pop(key).is_some_and(|entry| !entry.is_expired(now)) {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn flush_all(&self) -> CacheResult<()> {
        self.ensure_connected()?;
        rw_write(&self.entries, SOURCE, "flush_all").clear();
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        self.ensure_connected()
    }

    async fn quit(&self) -> CacheResult<()> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }
}
