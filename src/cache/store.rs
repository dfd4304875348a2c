//! Fail-soft cache store adapter.
//!
//! Wraps a [`CacheBackend`] and converts every backend failure into a logged
//! miss or a [`CacheOutcome::Failure`]. Callers never see a cache error
//! except from [`CacheStore::connect`].

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::backend::{self, CacheBackend};
use super::config::CacheConfig;
use super::error::{CacheError, CacheResult};
use super::lock::{rw_read, rw_write};
use super::{METRIC_CACHE_ERROR, METRIC_CACHE_STORE};

const SOURCE: &str = "cache::store";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// A live connection reported an error; operations keep being attempted
    /// and the first success moves the state back to `Connected`.
    Failed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        }
    }

    fn accepts_operations(self) -> bool {
        matches!(self, Self::Connected | Self::Failed)
    }
}

/// Result of a write-side cache operation.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Success,
    Failure,
}

impl CacheOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    fn from_result<T>(result: &CacheResult<T>) -> Self {
        if result.is_ok() {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

/// Snapshot reported by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub backend: &'static str,
    pub state: ConnectionState,
    pub reachable: bool,
}

pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    state: RwLock<ConnectionState>,
    connect_gate: Mutex<()>,
    operation_timeout: Duration,
    invalidation_timeout: Duration,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("backend", &self.backend.name())
            .field("state", &self.state())
            .finish()
    }
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        Self {
            backend,
            state: RwLock::new(ConnectionState::Disconnected),
            connect_gate: Mutex::new(()),
            operation_timeout: config.operation_timeout,
            invalidation_timeout: config.invalidation_timeout,
        }
    }

    /// Build the store and the backend selected by `config`. Does not connect.
    pub fn from_config(config: &CacheConfig) -> CacheResult<Self> {
        Ok(Self::new(backend::from_config(config)?, config))
    }

    pub fn state(&self) -> ConnectionState {
        *rw_read(&self.state, SOURCE, "state")
    }

    pub fn is_connected(&self) -> bool {
        self.state().accepts_operations()
    }

    fn set_state(&self, next: ConnectionState) -> ConnectionState {
        std::mem::replace(&mut *rw_write(&self.state, SOURCE, "set_state"), next)
    }

    /// Establish the backend connection.
    ///
    /// Idempotent: returns immediately once connected, and concurrent callers
    /// share a single attempt. The error is returned so the caller can decide
    /// whether an unreachable cache is fatal.
    pub async fn connect(&self) -> CacheResult<()> {
        let _gate = self.connect_gate.lock().await;
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        match self.backend.connect().await {
            Ok(()) => {
                self.set_state(ConnectionState::Connected);
                info!(
                    target = "planity::cache",
                    cache = self.backend.name(),
                    "Cache connected"
                );
                Ok(())
            }
            Err(err) => {
                self.set_state(ConnectionState::Disconnected);
                counter!(METRIC_CACHE_ERROR, "op" => "connect").increment(1);
                warn!(
                    target = "planity::cache",
                    cache = self.backend.name(),
                    error = %err,
                    "Cache connection failed"
                );
                Err(err)
            }
        }
    }

    /// Fetch a raw value. Misses and failures both yield `None`.
    pub async fn get_raw(&self, key: &str) -> Option<String> {
        let backend = Arc::clone(&self.backend);
        let result = self
            .run("get", key, self.operation_timeout, async move {
                backend.get(key).await
            })
            .await;
        result.ok().flatten()
    }

    /// Fetch and decode a JSON value. An undecodable entry counts as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                let err = CacheError::from(err);
                counter!(METRIC_CACHE_ERROR, "op" => "decode").increment(1);
                warn!(
                    target = "planity::cache",
                    key,
                    kind = err.kind(),
                    error = %err,
                    "Discarding undecodable cache entry"
                );
                None
            }
        }
    }

    pub async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> CacheOutcome {
        let backend = Arc::clone(&self.backend);
        let result = self
            .run("set", key, self.operation_timeout, async move {
                backend.set_ex(key, value, ttl).await
            })
            .await;
        if result.is_ok() {
            counter!(METRIC_CACHE_STORE).increment(1);
        }
        CacheOutcome::from_result(&result)
    }

    /// Serialize `value` as JSON and store it under `key` for `ttl`.
    pub async fn set_with_ttl<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> CacheOutcome {
        match serde_json::to_string(value) {
            Ok(raw) => self.set_raw(key, &raw, ttl).await,
            Err(err) => {
                let err = CacheError::from(err);
                counter!(METRIC_CACHE_ERROR, "op" => "encode").increment(1);
                warn!(
                    target = "planity::cache",
                    key,
                    kind = err.kind(),
                    error = %err,
                    "Failed to serialize cache entry"
                );
                CacheOutcome::Failure
            }
        }
    }

    pub async fn delete(&self, key: &str) -> CacheOutcome {
        let backend = Arc::clone(&self.backend);
        let result = self
            .run("delete", key, self.operation_timeout, async move {
                backend.delete(key).await
            })
            .await;
        CacheOutcome::from_result(&result)
    }

    /// Remove every entry whose key starts with `prefix`.
    pub async fn delete_by_prefix(&self, prefix: &str) -> CacheOutcome {
        let backend = Arc::clone(&self.backend);
        let result = self
            .run(
                "delete_prefix",
                prefix,
                self.invalidation_timeout,
                async move { backend.delete_prefix(prefix).await },
            )
            .await;
        if let Ok(deleted) = &result {
            debug!(target = "planity::cache", prefix, deleted, "Cache prefix invalidated");
        }
        CacheOutcome::from_result(&result)
    }

    /// Drop every key in the backend, not only response-cache keys.
    pub async fn flush_all(&self) -> CacheOutcome {
        let backend = Arc::clone(&self.backend);
        let result = self
            .run("flush_all", "*", self.invalidation_timeout, async move {
                backend.flush_all().await
            })
            .await;
        CacheOutcome::from_result(&result)
    }

    pub async fn health(&self) -> CacheHealth {
        let backend = Arc::clone(&self.backend);
        let reachable = self
            .run("ping", "", self.operation_timeout, async move {
                backend.ping().await
            })
            .await
            .is_ok();

        CacheHealth {
            backend: self.backend.name(),
            state: self.state(),
            reachable,
        }
    }

    /// Close the connection. Safe to call more than once.
    pub async fn quit(&self) -> CacheOutcome {
        let _gate = self.connect_gate.lock().await;
        let previous = self.set_state(ConnectionState::Disconnected);
        if previous == ConnectionState::Disconnected {
            return CacheOutcome::Success;
        }

        match self.backend.quit().await {
            Ok(()) => {
                info!(target = "planity::cache", cache = self.backend.name(), "Cache closed");
                CacheOutcome::Success
            }
            Err(err) => {
                warn!(
                    target = "planity::cache",
                    cache = self.backend.name(),
                    error = %err,
                    "Cache quit failed"
                );
                CacheOutcome::Failure
            }
        }
    }

    async fn run<T, F>(
        &self,
        op: &'static str,
        key: &str,
        timeout: Duration,
        operation: F,
    ) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        if !self.state().accepts_operations() {
            debug!(
                target = "planity::cache",
                op,
                key,
                state = self.state().as_str(),
                "Cache unavailable, skipping operation"
            );
            return Err(CacheError::NotConnected);
        }

        let result = match tokio::time::timeout(timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                op,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };

        match &result {
            Ok(_) => self.record_success(),
            Err(err) => self.record_failure(op, key, err),
        }
        result
    }

    fn record_success(&self) {
        let mut state = rw_write(&self.state, SOURCE, "record_success");
        if *state == ConnectionState::Failed {
            *state = ConnectionState::Connected;
            drop(state);
            info!(
                target = "planity::cache",
                cache = self.backend.name(),
                "Cache connection recovered"
            );
        }
    }

    fn record_failure(&self, op: &'static str, key: &str, err: &CacheError) {
        counter!(METRIC_CACHE_ERROR, "op" => op).increment(1);

        if err.is_connection_loss() {
            let mut state = rw_write(&self.state, SOURCE, "record_failure");
            if *state == ConnectionState::Connected {
                *state = ConnectionState::Failed;
            }
        }

        warn!(
            target = "planity::cache",
            cache = self.backend.name(),
            op,
            key,
            kind = err.kind(),
            error = %err,
            "Cache operation failed; continuing without cache"
        );
    }
}
