//! Periodic venue reconciliation: whitelist refresh and filled-entry cleanup.

use crate::exchange::ExecutionVenue;
use crate::market::WatchedPairs;
use crate::monitor::MonitorStore;
use crate::notify::ResultNotifier;
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run `tick` immediately and then every `every` until `shutdown` fires.
pub(super) fn spawn_periodic<F, Fut>(name: &'static str, every: Duration, shutdown: CancellationToken, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        info!(task = name, interval_secs = every.as_secs(), "Periodic task started");
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => tick().await,
            }
        }
        info!(task = name, "Periodic task stopped");
    })
}

/// Replace the watched set with the venue whitelist. On failure the
/// previous set is kept.
pub async fn refresh_whitelist(venue: &dyn ExecutionVenue, watched: &WatchedPairs) -> Result<usize> {
    let pairs = venue.whitelist().await?;
    let count = pairs.len();
    watched.replace(pairs);
    debug!(pairs = count, "Watched pairs refreshed");
    Ok(count)
}

pub fn spawn_whitelist_refresher(
    venue: Arc<dyn ExecutionVenue>,
    watched: Arc<WatchedPairs>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    spawn_periodic("whitelist_refresher", every, shutdown, move || {
        let venue = venue.clone();
        let watched = watched.clone();
        async move {
            if let Err(e) = refresh_whitelist(venue.as_ref(), &watched).await {
                warn!(error = %e, "Whitelist refresh failed, keeping previous set");
            }
        }
    })
}

/// Removes triggers whose entry order the venue has filled.
pub struct PositionReconciler {
    venue: Arc<dyn ExecutionVenue>,
    monitors: Arc<MonitorStore>,
    notifier: ResultNotifier,
}

impl PositionReconciler {
    pub fn new(venue: Arc<dyn ExecutionVenue>, monitors: Arc<MonitorStore>, notifier: ResultNotifier) -> Self {
        Self {
            venue,
            monitors,
            notifier,
        }
    }

    /// One pass over the venue's open trades. Returns the number of
    /// triggers removed.
    pub async fn reconcile_once(&self) -> Result<usize> {
        let trades = self.venue.open_trades().await?;
        let mut removed = 0;
        for trade in trades.iter().filter(|t| t.entry_filled) {
            if self.monitors.get(&trade.pair, trade.direction).is_none() {
                continue;
            }
            info!(pair = %trade.pair, direction = %trade.direction, "Position opened, removing monitor");
            self.monitors.delete(&trade.pair, trade.direction).await;
            self.notifier.notify(format!(
                "✅ {} {} position opened, monitor removed",
                trade.pair, trade.direction
            ));
            removed += 1;
        }
        Ok(removed)
    }

    pub fn spawn(self: Arc<Self>, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        spawn_periodic("position_reconciler", every, shutdown, move || {
            let reconciler = self.clone();
            async move {
                if let Err(e) = reconciler.reconcile_once().await {
                    warn!(error = %e, "Position reconciliation failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{MockExecutionVenue, OpenTrade};
    use crate::monitor::Direction;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    fn monitors() -> Arc<MonitorStore> {
        Arc::new(MonitorStore::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(3600),
        ))
    }

    #[tokio::test]
    async fn test_filled_entries_remove_matching_direction_only() {
        let monitors = monitors();
        monitors.set("ETH/USDT:USDT", Direction::Short, dec!(4000)).await.unwrap();
        monitors.set("ETH/USDT:USDT", Direction::Long, dec!(2000)).await.unwrap();
        monitors.set("SOL/USDT:USDT", Direction::Long, dec!(100)).await.unwrap();

        let mut venue = MockExecutionVenue::new();
        venue.expect_open_trades().returning(|| {
            Ok(vec![
                OpenTrade {
                    pair: "ETH/USDT:USDT".to_string(),
                    direction: Direction::Short,
                    entry_filled: true,
                },
                OpenTrade {
                    pair: "SOL/USDT:USDT".to_string(),
                    direction: Direction::Long,
                    entry_filled: false,
                },
            ])
        });
        let (notifier, mut notes) = ResultNotifier::channel(8);
        let reconciler = PositionReconciler::new(Arc::new(venue), monitors.clone(), notifier);

        assert_eq!(reconciler.reconcile_once().await.unwrap(), 1);
        assert!(monitors.get("ETH/USDT:USDT", Direction::Short).is_none());
        assert!(monitors.get("ETH/USDT:USDT", Direction::Long).is_some());
        assert!(monitors.get("SOL/USDT:USDT", Direction::Long).is_some());
        assert!(notes.try_recv().unwrap().contains("position opened"));

        // Nothing left to remove on the next pass
        assert_eq!(reconciler.reconcile_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_whitelist_failure_keeps_previous_set() {
        let watched = WatchedPairs::new();
        watched.replace(vec!["BTC/USDT:USDT".to_string()]);

        let mut venue = MockExecutionVenue::new();
        venue
            .expect_whitelist()
            .times(1)
            .returning(|| Err(anyhow::anyhow!("401 Unauthorized")));
        venue
            .expect_whitelist()
            .returning(|| Ok(vec!["ETH/USDT:USDT".to_string(), "SOL/USDT:USDT".to_string()]));

        assert!(refresh_whitelist(&venue, &watched).await.is_err());
        assert_eq!(watched.snapshot(), vec!["BTC/USDT:USDT".to_string()]);

        assert_eq!(refresh_whitelist(&venue, &watched).await.unwrap(), 2);
        assert!(!watched.contains("BTC/USDT:USDT"));
    }

    #[tokio::test]
    async fn test_refresher_runs_at_startup() {
        let watched = Arc::new(WatchedPairs::new());
        let mut venue = MockExecutionVenue::new();
        venue
            .expect_whitelist()
            .returning(|| Ok(vec!["BTC/USDT:USDT".to_string()]));

        let shutdown = CancellationToken::new();
        let handle = spawn_whitelist_refresher(Arc::new(venue), watched.clone(), Duration::from_secs(3600), shutdown.clone());
        for _ in 0..50 {
            if !watched.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(watched.len(), 1);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
