//! Webhook recursion detection.
//!
//! Every delivery carries an event UUID in `X-Hook-Event-UUID`. A receiver
//! that reacts by producing a new event passes that UUID back, so all hooks
//! fired along one causal chain share it. The chain remembers which hooks it
//! has already called; a hook seen twice, or a chain that has grown too long,
//! is blocked instead of looping forever.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

use crate::rate_limit::CounterError;

/// How long a call chain is remembered after its last delivery.
pub const CHAIN_TTL_SECS: u64 = 30 * 60;

/// Ephemeral set store keyed by call chain.
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Adds `hook_id` to the chain at `key`, (re)arming its expiry.
    async fn add(&self, key: &str, hook_id: Uuid, expires_in_secs: u64) -> Result<(), CounterError>;

    async fn members(&self, key: &str) -> Result<HashSet<Uuid>, CounterError>;
}

/// Process-local [`ChainStore`].
#[derive(Default)]
pub struct InMemoryChains {
    chains: Mutex<HashMap<String, (HashSet<Uuid>, Instant)>>,
}

impl InMemoryChains {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChainStore for InMemoryChains {
    async fn add(&self, key: &str, hook_id: Uuid, expires_in_secs: u64) -> Result<(), CounterError> {
        let now = Instant::now();
        let mut chains = self.chains.lock().await;
        chains.retain(|_, (_, expires_at)| *expires_at > now);

        let expires_at = now + Duration::from_secs(expires_in_secs);
        let entry = chains
            .entry(key.to_string())
            .or_insert_with(|| (HashSet::new(), expires_at));
        entry.0.insert(hook_id);
        entry.1 = expires_at;
        Ok(())
    }

    async fn members(&self, key: &str) -> Result<HashSet<Uuid>, CounterError> {
        let now = Instant::now();
        let chains = self.chains.lock().await;
        Ok(chains
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(members, _)| members.clone())
            .unwrap_or_default())
    }
}

/// Why a delivery was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recursion {
    /// The hook already fired earlier in this chain.
    Repeated,
    /// The chain has reached the configured number of hooks.
    ChainTooLong { calls: usize },
}

#[derive(Clone)]
pub struct RecursionGuard {
    store: Arc<dyn ChainStore>,
    count_limit: usize,
}

impl RecursionGuard {
    pub fn new(store: Arc<dyn ChainStore>, count_limit: usize) -> Self {
        Self { store, count_limit }
    }

    pub fn in_memory(count_limit: usize) -> Self {
        Self::new(Arc::new(InMemoryChains::new()), count_limit)
    }

    /// Checks whether `hook_id` may fire within the chain `event_uuid`.
    /// Fails open when the store is unavailable.
    pub async fn check(&self, hook_id: Uuid, event_uuid: Uuid) -> Option<Recursion> {
        let members = match self.store.members(&chain_key(event_uuid)).await {
            Ok(members) => members,
            Err(err) => {
                warn!(hook_id = %hook_id, %event_uuid, error = %err, "recursion check failed open");
                return None;
            }
        };

        if members.contains(&hook_id) {
            Some(Recursion::Repeated)
        } else if members.len() >= self.count_limit {
            Some(Recursion::ChainTooLong {
                calls: members.len(),
            })
        } else {
            None
        }
    }

    /// Records that `hook_id` fired within the chain `event_uuid`.
    pub async fn register(&self, hook_id: Uuid, event_uuid: Uuid) {
        if let Err(err) = self
            .store
            .add(&chain_key(event_uuid), hook_id, CHAIN_TTL_SECS)
            .await
        {
            warn!(hook_id = %hook_id, %event_uuid, error = %err, "recursion chain not recorded");
        }
    }
}

fn chain_key(event_uuid: Uuid) -> String {
    format!("web_hook_chain:{event_uuid}")
}
