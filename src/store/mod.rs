//! Durable, TTL-bearing key/value store shared across process instances.
//!
//! The monitor replica, its change notifications and the trade locks all
//! go through [`DurableStore`]. Two backends exist:
//! - [`RedisStore`]: production backend using keyspace notifications
//! - [`MemoryStore`]: single-process backend with the same semantics

mod error;
mod memory;
mod redis_store;

pub use self::error::{StoreError, StoreResult};
pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use crate::config::RedisConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// URL scheme selecting the in-process backend.
pub const MEMORY_URL: &str = "memory://";

const MEMORY_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Kind of change reported for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEventKind {
    Set,
    Deleted,
    Expired,
    Other(String),
}

impl KeyEventKind {
    /// Map a Redis keyspace notification payload.
    pub fn from_payload(payload: &str) -> Self {
        match payload {
            "set" => KeyEventKind::Set,
            "del" => KeyEventKind::Deleted,
            "expired" => KeyEventKind::Expired,
            other => KeyEventKind::Other(other.to_string()),
        }
    }
}

/// Change notification for a single key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: String,
    pub kind: KeyEventKind,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>, kind: KeyEventKind) -> Self {
        Self {
            key: key.into(),
            kind,
        }
    }
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Remaining(Duration),
    Persistent,
    Missing,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Unconditional write with expiry.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Write only if the key is absent. Returns whether the write happened.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    async fn del(&self, key: &str) -> StoreResult<()>;

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl>;

    /// All live keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Stream of change notifications for keys starting with `prefix`.
    ///
    /// The receiver closes when the underlying subscription is lost.
    async fn subscribe(&self, prefix: &str) -> StoreResult<mpsc::Receiver<KeyEvent>>;

    /// Make sure the backend emits change notifications.
    /// Returns true when the backend configuration was changed.
    async fn enable_notifications(&self) -> StoreResult<bool>;
}

/// Open the backend selected by `config.url`.
pub async fn open(config: &RedisConfig, shutdown: &CancellationToken) -> Result<Arc<dyn DurableStore>> {
    if config.url.starts_with(MEMORY_URL) {
        info!("Using in-process durable store");
        let store = Arc::new(MemoryStore::new());
        store.clone().spawn_sweeper(MEMORY_SWEEP_INTERVAL, shutdown.clone());
        return Ok(store);
    }

    let store = RedisStore::connect(&config.url, config.db)
        .await
        .with_context(|| format!("Failed to connect to durable store at {}", config.url))?;
    info!(url = %config.url, db = config.db, "Connected to Redis");
    Ok(Arc::new(store))
}
