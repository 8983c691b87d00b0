use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::types::Endpoint;

/// Length of the rate limit window. `Endpoint::rate_limit` is calls per window.
pub const WINDOW_SECS: i64 = 60;

const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Ephemeral counter service (a cache with atomic increment and expiry).
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increments `key`, (re)arming its expiry, and returns the new count.
    async fn increment(&self, key: &str, expires_in_secs: u64) -> Result<u64, CounterError>;
}

/// Process-local [`CounterStore`].
#[derive(Default)]
pub struct InMemoryCounter {
    counters: Mutex<HashMap<String, (u64, Instant)>>,
}

impl InMemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounter {
    async fn increment(&self, key: &str, expires_in_secs: u64) -> Result<u64, CounterError> {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;

        if counters.len() > PRUNE_THRESHOLD {
            counters.retain(|_, (_, expires_at)| *expires_at > now);
        }

        let expires_at = now + Duration::from_secs(expires_in_secs);
        let entry = counters.entry(key.to_string()).or_insert((0, expires_at));
        if entry.1 <= now {
            *entry = (0, expires_at);
        }
        entry.0 += 1;
        entry.1 = expires_at;

        Ok(entry.0)
    }
}

/// Per-endpoint fixed-window limiter.
///
/// Every check consumes one unit of the endpoint's budget, including checks
/// that come back limited, so callers check exactly once per attempt.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCounter::new()))
    }

    pub async fn rate_limited(&self, endpoint: &Endpoint) -> bool {
        self.rate_limited_at(endpoint, Utc::now()).await
    }

    pub async fn rate_limited_at(&self, endpoint: &Endpoint, now: DateTime<Utc>) -> bool {
        if endpoint.rate_limit == 0 {
            return false;
        }

        let timestamp = now.timestamp();
        let period = timestamp.div_euclid(WINDOW_SECS);
        let elapsed = timestamp.rem_euclid(WINDOW_SECS);
        let key = format!("web_hook_calls:{}:{period}", endpoint.id);
        // One extra second so a key never expires just before its period ends.
        let expires_in = (WINDOW_SECS - elapsed + 1).unsigned_abs();

        match self.store.increment(&key, expires_in).await {
            Ok(count) => count > u64::from(endpoint.rate_limit),
            Err(err) => {
                warn!(hook_id = %endpoint.id, error = %err, "rate limit check failed open");
                false
            }
        }
    }
}
