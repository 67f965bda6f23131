//! Dual-backed trigger store.

use super::entry::{durable_key, parse_durable_key, Direction, MonitorEntry, MONITOR_PREFIX};
use crate::store::{DurableStore, KeyTtl, StoreResult};
use chrono::Utc;
use parking_lot::RwLock;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type LocalKey = (String, Direction);

/// Local entry plus what a reload needs to decide whether to prune it.
#[derive(Debug, Clone)]
struct Slot {
    entry: MonitorEntry,
    /// Entry is known to exist in the durable store
    replicated: bool,
    /// Local write sequence number
    seq: u64,
}

/// Remaining lifetime of an entry's durable replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainingTtl {
    Expires(Duration),
    NoExpiry,
    /// Entry exists locally but not in the durable store
    NotReplicated,
    /// TTL lookup failed
    Unknown,
}

impl fmt::Display for RemainingTtl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemainingTtl::Expires(left) => {
                let secs = left.as_secs();
                write!(f, "{}d {:02}h {:02}m", secs / 86_400, (secs % 86_400) / 3600, (secs % 3600) / 60)
            }
            RemainingTtl::NoExpiry => f.write_str("no expiry"),
            RemainingTtl::NotReplicated => f.write_str("not replicated"),
            RemainingTtl::Unknown => f.write_str("unknown"),
        }
    }
}

/// Entry snapshot with the TTL of its replica.
#[derive(Debug, Clone)]
pub struct MonitorListing {
    pub entry: MonitorEntry,
    pub ttl: RemainingTtl,
}

/// Authoritative in-memory trigger map replicated to a durable store.
pub struct MonitorStore {
    entries: RwLock<HashMap<LocalKey, Slot>>,
    write_seq: AtomicU64,
    pub(super) durable: Arc<dyn DurableStore>,
    expiry_window: Duration,
}

impl MonitorStore {
    /// Create a store whose replicas expire between half and all of
    /// `expiry_window`.
    pub fn new(durable: Arc<dyn DurableStore>, expiry_window: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            write_seq: AtomicU64::new(0),
            durable,
            expiry_window,
        }
    }

    pub fn get(&self, pair: &str, direction: Direction) -> Option<MonitorEntry> {
        self.entries
            .read()
            .get(&(pair.to_string(), direction))
            .map(|slot| slot.entry.clone())
    }

    /// Set or replace the trigger for (pair, direction).
    ///
    /// The local map is updated first and stays updated even when the
    /// durable write fails; that failure is returned to the caller.
    pub async fn set(&self, pair: &str, direction: Direction, limit_price: Decimal) -> StoreResult<()> {
        let entry = MonitorEntry {
            pair: pair.to_string(),
            direction,
            limit_price,
            updated_at: Utc::now(),
        };
        let key = entry.durable_key();
        let payload = entry.to_record_json()?;

        let local_key = (pair.to_string(), direction);
        let seq = self.insert_slot(entry, false);

        let ttl = self.jittered_expiry();
        if let Err(e) = self.durable.set_ex(&key, &payload, ttl).await {
            warn!(%key, error = %e, "Durable monitor write failed, keeping local entry");
            return Err(e);
        }
        if let Some(slot) = self.entries.write().get_mut(&local_key) {
            if slot.seq == seq {
                slot.replicated = true;
            }
        }

        info!(%pair, %direction, %limit_price, ttl_secs = ttl.as_secs(), "Monitor set");
        Ok(())
    }

    /// Remove the trigger locally, then best-effort from the durable store.
    /// Returns whether a local entry existed.
    pub async fn delete(&self, pair: &str, direction: Direction) -> bool {
        let existed = self.remove_local(pair, direction);

        let key = durable_key(pair, direction);
        if let Err(e) = self.durable.del(&key).await {
            warn!(%key, error = %e, "Durable monitor delete failed");
        }
        existed
    }

    /// Snapshot of local entries, optionally filtered by direction, with the
    /// TTL of each durable replica.
    pub async fn list_all(&self, filter: Option<Direction>) -> Vec<MonitorListing> {
        let mut snapshot: Vec<MonitorEntry> = self
            .entries
            .read()
            .values()
            .map(|slot| &slot.entry)
            .filter(|e| filter.map_or(true, |d| e.direction == d))
            .cloned()
            .collect();
        snapshot.sort_by(|a, b| {
            a.pair
                .cmp(&b.pair)
                .then_with(|| a.direction.as_str().cmp(b.direction.as_str()))
        });

        let mut listings = Vec::with_capacity(snapshot.len());
        for entry in snapshot {
            let key = entry.durable_key();
            let ttl = match self.durable.ttl(&key).await {
                Ok(KeyTtl::Remaining(left)) => RemainingTtl::Expires(left),
                Ok(KeyTtl::Persistent) => RemainingTtl::NoExpiry,
                Ok(KeyTtl::Missing) => RemainingTtl::NotReplicated,
                Err(e) => {
                    warn!(%key, error = %e, "TTL lookup failed");
                    RemainingTtl::Unknown
                }
            };
            listings.push(MonitorListing { entry, ttl });
        }
        listings
    }

    /// Bring the local map in line with every durable monitor key.
    ///
    /// Scanned entries are inserted or replaced. Replicated local entries
    /// whose key is gone from the durable store are pruned; entries whose
    /// durable write failed, and entries written locally while the scan was
    /// running, are kept. Unreadable or malformed keys are skipped.
    /// Returns the number of entries loaded.
    pub async fn load_from_durable_store(&self) -> StoreResult<usize> {
        let mark = self.write_seq.load(Ordering::SeqCst);
        let keys = self.durable.scan_prefix(MONITOR_PREFIX).await?;
        let scanned: HashSet<LocalKey> = keys
            .iter()
            .filter_map(|key| parse_durable_key(key).ok())
            .collect();
        info!(keys = keys.len(), "Loading monitors from durable store");

        let mut loaded = Vec::with_capacity(keys.len());
        for key in keys {
            let value = match self.durable.get(&key).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    warn!(%key, error = %e, "Failed to read monitor key");
                    continue;
                }
            };
            match MonitorEntry::from_record(&key, &value) {
                Ok(entry) => loaded.push(entry),
                Err(e) => warn!(%key, error = %e, "Skipping malformed monitor record"),
            }
        }

        let count = loaded.len();
        let mut entries = self.entries.write();
        for entry in loaded {
            let local_key = (entry.pair.clone(), entry.direction);
            if entries.get(&local_key).is_some_and(|slot| slot.seq >= mark) {
                continue;
            }
            debug!(pair = %entry.pair, direction = %entry.direction, "Loaded monitor");
            let seq = self.write_seq.fetch_add(1, Ordering::SeqCst);
            entries.insert(
                local_key,
                Slot {
                    entry,
                    replicated: true,
                    seq,
                },
            );
        }

        let before = entries.len();
        entries.retain(|key, slot| scanned.contains(key) || !slot.replicated || slot.seq >= mark);
        let pruned = before - entries.len();
        if pruned > 0 {
            info!(pruned, "Pruned monitors missing from durable store");
        }
        info!(loaded = count, total = entries.len(), "Monitor load complete");
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Insert or replace a local entry read from the durable store.
    pub(super) fn merge(&self, entry: MonitorEntry) {
        self.insert_slot(entry, true);
    }

    fn insert_slot(&self, entry: MonitorEntry, replicated: bool) -> u64 {
        let mut entries = self.entries.write();
        let seq = self.write_seq.fetch_add(1, Ordering::SeqCst);
        entries.insert(
            (entry.pair.clone(), entry.direction),
            Slot {
                entry,
                replicated,
                seq,
            },
        );
        seq
    }

    pub(super) fn remove_local(&self, pair: &str, direction: Direction) -> bool {
        let removed = self
            .entries
            .write()
            .remove(&(pair.to_string(), direction))
            .is_some();
        if removed {
            info!(%pair, %direction, "Monitor removed");
        }
        removed
    }

    /// Uniform expiry in [window / 2, window] so replicas do not expire
    /// together. The lower bound uses integer seconds, so a window under
    /// 2s would collapse it to zero; `Config::validate` rejects those.
    fn jittered_expiry(&self) -> Duration {
        let max = self.expiry_window.as_secs().max(1);
        let min = max / 2;
        Duration::from_secs(rand::thread_rng().gen_range(min..=max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MockDurableStore, StoreError};
    use rust_decimal_macros::dec;

    const PAIR: &str = "BTC/USDT:USDT";

    fn memory_store() -> (Arc<MemoryStore>, MonitorStore) {
        let durable = Arc::new(MemoryStore::new());
        let store = MonitorStore::new(durable.clone(), Duration::from_secs(3600));
        (durable, store)
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable("connection refused".to_string())
    }

    #[tokio::test]
    async fn test_set_replicates_with_jittered_ttl() {
        let (durable, store) = memory_store();
        store.set(PAIR, Direction::Long, dec!(50000)).await.unwrap();

        assert_eq!(store.get(PAIR, Direction::Long).unwrap().limit_price, dec!(50000));
        assert!(store.get(PAIR, Direction::Short).is_none());

        let raw = durable.get("monitor:BTC/USDT:USDT:long").await.unwrap().unwrap();
        assert!(raw.contains("\"direct\":\"long\""));
        match durable.ttl("monitor:BTC/USDT:USDT:long").await.unwrap() {
            KeyTtl::Remaining(left) => {
                assert!(left <= Duration::from_secs(3600));
                assert!(left >= Duration::from_secs(1799));
            }
            other => panic!("unexpected ttl {:?}", other),
        }
    }

    #[test]
    fn test_jitter_stays_in_window() {
        let (_, store) = memory_store();
        for _ in 0..200 {
            let ttl = store.jittered_expiry();
            assert!(ttl >= Duration::from_secs(1800) && ttl <= Duration::from_secs(3600));
        }
    }

    #[tokio::test]
    async fn test_last_local_call_wins_when_durable_is_down() {
        let mut durable = MockDurableStore::new();
        durable.expect_set_ex().returning(|_, _, _| Err(unavailable()));
        durable.expect_del().returning(|_| Err(unavailable()));
        let store = MonitorStore::new(Arc::new(durable), Duration::from_secs(3600));

        assert!(store.set(PAIR, Direction::Short, dec!(10)).await.is_err());
        assert!(store.set(PAIR, Direction::Short, dec!(12)).await.is_err());
        assert_eq!(store.get(PAIR, Direction::Short).unwrap().limit_price, dec!(12));

        assert!(store.delete(PAIR, Direction::Short).await);
        assert!(store.get(PAIR, Direction::Short).is_none());

        assert!(store.set(PAIR, Direction::Short, dec!(11)).await.is_err());
        assert_eq!(store.get(PAIR, Direction::Short).unwrap().limit_price, dec!(11));
    }

    #[tokio::test]
    async fn test_delete_removes_replica() {
        let (durable, store) = memory_store();
        store.set(PAIR, Direction::Short, dec!(70000)).await.unwrap();
        assert!(store.delete(PAIR, Direction::Short).await);
        assert!(!store.delete(PAIR, Direction::Short).await);
        assert_eq!(durable.get("monitor:BTC/USDT:USDT:short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_all_reports_unknown_ttl_on_lookup_failure() {
        let mut durable = MockDurableStore::new();
        durable.expect_set_ex().returning(|_, _, _| Ok(()));
        durable
            .expect_ttl()
            .returning(|key| match key {
                "monitor:ETH/USDT:USDT:long" => Err(StoreError::Unavailable("timeout".to_string())),
                _ => Ok(KeyTtl::Remaining(Duration::from_secs(90_000))),
            });
        let store = MonitorStore::new(Arc::new(durable), Duration::from_secs(3600));

        store.set(PAIR, Direction::Long, dec!(1)).await.unwrap();
        store.set("ETH/USDT:USDT", Direction::Long, dec!(2)).await.unwrap();
        store.set("ETH/USDT:USDT", Direction::Short, dec!(3)).await.unwrap();

        let longs = store.list_all(Some(Direction::Long)).await;
        assert_eq!(longs.len(), 2);
        assert_eq!(longs[0].entry.pair, PAIR);
        assert_eq!(longs[0].ttl, RemainingTtl::Expires(Duration::from_secs(90_000)));
        assert_eq!(longs[1].ttl, RemainingTtl::Unknown);

        assert_eq!(store.list_all(None).await.len(), 3);
        assert_eq!(longs[0].ttl.to_string(), "1d 01h 00m");
    }

    #[tokio::test]
    async fn test_load_survives_restart() {
        let (durable, first) = memory_store();
        first.set(PAIR, Direction::Long, dec!(42000)).await.unwrap();
        first.set("SOL/USDT:USDT", Direction::Short, dec!(250)).await.unwrap();
        durable
            .set_ex("monitor:BAD/USDT:USDT:long", "not json", Duration::from_secs(60))
            .await
            .unwrap();

        let restarted = MonitorStore::new(durable, Duration::from_secs(3600));
        assert_eq!(restarted.load_from_durable_store().await.unwrap(), 2);
        assert_eq!(
            restarted.get("SOL/USDT:USDT", Direction::Short).unwrap().limit_price,
            dec!(250)
        );
        assert_eq!(restarted.len(), 2);
    }

    #[tokio::test]
    async fn test_reload_prunes_keys_deleted_elsewhere() {
        let (durable, store) = memory_store();
        store.set(PAIR, Direction::Long, dec!(42000)).await.unwrap();
        store.set("SOL/USDT:USDT", Direction::Short, dec!(250)).await.unwrap();

        // Another instance cancels the long trigger
        durable.del("monitor:BTC/USDT:USDT:long").await.unwrap();

        assert_eq!(store.load_from_durable_store().await.unwrap(), 1);
        assert!(store.get(PAIR, Direction::Long).is_none());
        assert!(store.get("SOL/USDT:USDT", Direction::Short).is_some());
    }

    #[tokio::test]
    async fn test_reload_keeps_entry_whose_write_failed() {
        let mut durable = MockDurableStore::new();
        durable.expect_set_ex().returning(|_, _, _| Err(unavailable()));
        durable.expect_scan_prefix().returning(|_| Ok(vec![]));
        let store = MonitorStore::new(Arc::new(durable), Duration::from_secs(3600));

        assert!(store.set(PAIR, Direction::Short, dec!(10)).await.is_err());
        assert_eq!(store.load_from_durable_store().await.unwrap(), 0);
        assert_eq!(store.get(PAIR, Direction::Short).unwrap().limit_price, dec!(10));
    }
}
