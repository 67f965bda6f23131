//! Cross-instance per-pair trade lock.
//!
//! A lock is a durable key with a fixed expiry. It is never released after a
//! successful dispatch, so the expiry doubles as a per-pair cooldown.

use crate::store::{DurableStore, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Namespace of durable lock keys: `trade:{pair}`.
pub const LOCK_PREFIX: &str = "trade:";

const LOCK_MARKER: &str = "locked";

#[derive(Clone)]
pub struct TradeLockManager {
    durable: Arc<dyn DurableStore>,
    ttl: Duration,
}

impl TradeLockManager {
    pub fn new(durable: Arc<dyn DurableStore>, ttl: Duration) -> Self {
        Self { durable, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Atomically claim the pair. Returns false when another caller holds
    /// the lock or the store could not be reached.
    pub async fn acquire(&self, pair: &str) -> bool {
        let key = lock_key(pair);
        match self.durable.set_nx_ex(&key, LOCK_MARKER, self.ttl).await {
            Ok(acquired) => {
                debug!(%pair, acquired, "Trade lock attempt");
                acquired
            }
            Err(e) => {
                warn!(%pair, error = %e, "Trade lock unavailable, treating as held");
                false
            }
        }
    }

    /// Drop the lock before it expires.
    pub async fn release(&self, pair: &str) -> StoreResult<()> {
        self.durable.del(&lock_key(pair)).await
    }
}

fn lock_key(pair: &str) -> String {
    format!("{LOCK_PREFIX}{pair}")
}
