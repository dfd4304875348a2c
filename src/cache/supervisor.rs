//! Background reconnect loop for a cache that was unreachable at startup.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::store::CacheStore;

/// Retry [`CacheStore::connect`] every `interval` until it succeeds.
///
/// The task ends on its own once connected; abort the handle at shutdown.
pub fn spawn_reconnect_supervisor(store: Arc<CacheStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // Skip the first immediate tick
        let mut attempts: u64 = 0;

        loop {
            ticker.tick().await;
            if store.is_connected() {
                break;
            }

            attempts += 1;
            match store.connect().await {
                Ok(()) => {
                    info!(
                        target = "planity::cache",
                        attempts,
                        "Cache reconnected; response caching enabled"
                    );
                    break;
                }
                Err(err) => debug!(
                    target = "planity::cache",
                    attempts,
                    error = %err,
                    "Cache still unreachable"
                ),
            }
        }
    })
}
