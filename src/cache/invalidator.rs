//! Cache invalidation hook.
//!
//! Services call into this right after a successful write. Invalidation is
//! fail-soft: a failed sweep is logged and the stale entries expire at TTL.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use super::METRIC_CACHE_INVALIDATE;
use super::config::CacheConfig;
use super::keys::CacheNamespace;
use super::store::{CacheOutcome, CacheStore};

/// Drops cached views affected by a mutation.
///
/// # Usage
///
/// ```ignore
/// // After a task update has been written:
/// invalidator.tasks_changed().await;
/// ```
pub struct CacheInvalidator {
    store: Arc<CacheStore>,
    enabled: bool,
}

impl CacheInvalidator {
    pub fn new(store: Arc<CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            enabled: config.is_enabled(),
        }
    }

    /// Delete every key under each prefix of `namespace`.
    pub async fn invalidate(&self, namespace: CacheNamespace) -> CacheOutcome {
        if !self.enabled {
            debug!(
                target = "planity::cache",
                namespace = namespace.as_str(),
                "Cache invalidation skipped: cache disabled"
            );
            return CacheOutcome::Success;
        }

        let mut outcome = CacheOutcome::Success;
        for prefix in namespace.prefixes() {
            if !self.store.delete_by_prefix(prefix).await.is_success() {
                outcome = CacheOutcome::Failure;
            }
        }

        counter!(METRIC_CACHE_INVALIDATE, "namespace" => namespace.as_str()).increment(1);
        match outcome {
            CacheOutcome::Success => debug!(
                target = "planity::cache",
                namespace = namespace.as_str(),
                "Cache namespace invalidated"
            ),
            CacheOutcome::Failure => warn!(
                target = "planity::cache",
                namespace = namespace.as_str(),
                "Cache invalidation incomplete; entries will expire at TTL"
            ),
        }
        outcome
    }

    /// Invalidate several namespaces; every one is attempted.
    pub async fn invalidate_many(&self, namespaces: &[CacheNamespace]) -> CacheOutcome {
        let mut outcome = CacheOutcome::Success;
        for namespace in namespaces {
            if !self.invalidate(*namespace).await.is_success() {
                outcome = CacheOutcome::Failure;
            }
        }
        outcome
    }

    /// A task was created, edited, trashed, restored or deleted.
    pub async fn tasks_changed(&self) -> CacheOutcome {
        self.invalidate(CacheNamespace::Tasks).await
    }

    /// Notices were created or marked read.
    pub async fn notifications_changed(&self) -> CacheOutcome {
        self.invalidate(CacheNamespace::Notifications).await
    }

    /// Task payloads and dashboard statistics embed user data, so a user
    /// change drops both families.
    pub async fn users_changed(&self) -> CacheOutcome {
        self.invalidate_many(&[CacheNamespace::Users, CacheNamespace::Tasks])
            .await
    }

    /// Drop everything in the backend.
    pub async fn flush(&self) -> CacheOutcome {
        if !self.enabled {
            return CacheOutcome::Success;
        }
        self.store.flush_all().await
    }
}
