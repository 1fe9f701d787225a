//! Per-provider call shaping: rate limiter and timeout guard
//!
//! The limiter enforces a minimum interval between consecutive calls to the
//! same provider key. Keys are independent; two calls for the same key
//! serialize through that key's async mutex, calls for different keys never
//! wait on each other.

use crate::error::EngineError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Keyed minimum-interval rate limiter
///
/// Read-mostly and shared: the key map is guarded by a std mutex held only
/// for lookup/insert, the per-key state by an async mutex held across the
/// wait.
#[derive(Default)]
pub struct RateLimiter {
    keys: StdMutex<HashMap<String, Arc<Mutex<Option<Instant>>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait if necessary to keep `min_interval` between calls for `key`
    pub async fn wait(&self, key: &str, min_interval: Duration) {
        if min_interval.is_zero() {
            return;
        }

        let cell = {
            // A panic elsewhere while holding the map lock only interrupted a
            // lookup/insert; the map itself stays consistent, so recover the
            // guard instead of cascading the panic.
            let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
            keys.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .clone()
        };

        let mut last = cell.lock().await;
        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < min_interval {
                let wait_time = min_interval - elapsed;
                debug!(provider = key, "Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Run a provider call under its per-call timeout
///
/// An exceeded deadline becomes `EngineError::ProviderTimeout` for that
/// provider only; siblings are unaffected.
pub async fn guard_timeout<T, F>(
    provider: &str,
    limit: Duration,
    fut: F,
) -> Result<T, EngineError>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(value) => Ok(value),
        Err(_) => Err(EngineError::ProviderTimeout {
            provider: provider.to_string(),
            elapsed_ms: limit.as_millis() as u64,
        }),
    }
}
