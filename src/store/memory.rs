//! In-process backend with Redis-like expiry and change notifications.
//!
//! Expired keys are reclaimed lazily on access and by [`MemoryStore::sweep_expired`],
//! each emitting an `Expired` event the way Redis does.

use super::{DurableStore, KeyEvent, KeyEventKind, KeyTtl, StoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

pub struct MemoryStore {
    entries: Mutex<HashMap<String, Slot>>,
    events: broadcast::Sender<KeyEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            entries: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn emit(&self, key: &str, kind: KeyEventKind) {
        // No subscribers is fine
        let _ = self.events.send(KeyEvent::new(key, kind));
    }

    /// Remove the key if its deadline has passed. Returns the live slot.
    fn live_slot(&self, key: &str) -> Option<Slot> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            None => return None,
            Some(slot) if !slot.is_expired(now) => return Some(slot.clone()),
            Some(_) => {}
        }
        entries.remove(key);
        drop(entries);
        self.emit(key, KeyEventKind::Expired);
        None
    }

    /// Drop every expired key, emitting an `Expired` event for each.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = {
            let mut entries = self.entries.lock();
            let keys: Vec<String> = entries
                .iter()
                .filter(|(_, slot)| slot.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                entries.remove(key);
            }
            keys
        };

        for key in &expired {
            self.emit(key, KeyEventKind::Expired);
        }
        expired.len()
    }

    /// Periodically sweep expired keys until `shutdown` fires.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => {
                        let swept = self.sweep_expired();
                        if swept > 0 {
                            debug!(swept, "Expired in-memory keys");
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.live_slot(key).map(|slot| slot.value))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let slot = Slot {
            value: value.to_string(),
            expires_at: Some(Instant::now() + ttl),
        };
        self.entries.lock().insert(key.to_string(), slot);
        self.emit(key, KeyEventKind::Set);
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|slot| !slot.is_expired(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        drop(entries);
        self.emit(key, KeyEventKind::Set);
        Ok(true)
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let removed = self.entries.lock().remove(key);
        if removed.is_some() {
            self.emit(key, KeyEventKind::Deleted);
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        Ok(match self.live_slot(key) {
            None => KeyTtl::Missing,
            Some(Slot { expires_at: None, .. }) => KeyTtl::Persistent,
            Some(Slot {
                expires_at: Some(deadline),
                ..
            }) => KeyTtl::Remaining(deadline.saturating_duration_since(Instant::now())),
        })
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        let entries = self.entries.lock();
        Ok(entries
            .iter()
            .filter(|(key, slot)| key.starts_with(prefix) && !slot.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn subscribe(&self, prefix: &str) -> StoreResult<mpsc::Receiver<KeyEvent>> {
        let mut events = self.events.subscribe();
        let prefix = prefix.to_string();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.key.starts_with(&prefix) => {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "In-memory event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        Ok(rx)
    }

    async fn enable_notifications(&self) -> StoreResult<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_nx_only_once() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(120);
        assert!(store.set_nx_ex("trade:BTC", "locked", ttl).await.unwrap());
        assert!(!store.set_nx_ex("trade:BTC", "locked", ttl).await.unwrap());
        assert!(store.set_nx_ex("trade:ETH", "locked", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_key_is_gone_and_reported() {
        let store = MemoryStore::new();
        let mut events = store.subscribe("monitor:").await.unwrap();

        store
            .set_ex("monitor:a:long", "{}", Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(events.recv().await.unwrap().kind, KeyEventKind::Set);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.get("monitor:a:long").await.unwrap(), None);
        assert_eq!(store.ttl("monitor:a:long").await.unwrap(), KeyTtl::Missing);

        let event = events.recv().await.unwrap();
        assert_eq!(event, KeyEvent::new("monitor:a:long", KeyEventKind::Expired));
    }

    #[tokio::test]
    async fn test_subscribe_filters_by_prefix() {
        let store = MemoryStore::new();
        let mut events = store.subscribe("monitor:").await.unwrap();

        store.set_ex("trade:BTC", "locked", Duration::from_secs(1)).await.unwrap();
        store.set_ex("monitor:b:short", "{}", Duration::from_secs(1)).await.unwrap();
        store.del("monitor:b:short").await.unwrap();

        assert_eq!(events.recv().await.unwrap().key, "monitor:b:short");
        assert_eq!(events.recv().await.unwrap().kind, KeyEventKind::Deleted);
    }

    #[tokio::test]
    async fn test_scan_and_ttl() {
        let store = MemoryStore::new();
        store.set_ex("monitor:x:long", "1", Duration::from_secs(60)).await.unwrap();
        store.set_ex("trade:x", "locked", Duration::from_secs(60)).await.unwrap();

        let keys = store.scan_prefix("monitor:").await.unwrap();
        assert_eq!(keys, vec!["monitor:x:long".to_string()]);

        match store.ttl("monitor:x:long").await.unwrap() {
            KeyTtl::Remaining(left) => assert!(left <= Duration::from_secs(60)),
            other => panic!("unexpected ttl {:?}", other),
        }
    }
}
