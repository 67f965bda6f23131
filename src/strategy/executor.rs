//! Lock-guarded order execution.

use super::dispatch::TradeIntent;
use crate::exchange::ExecutionVenue;
use crate::monitor::{MonitorStore, TradeLockManager};
use crate::notify::ResultNotifier;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Result of processing one intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Another attempt holds the pair's lock
    LockHeld,
    /// No room on the venue or already positioned; trigger removed
    PositionCheckFailed(String),
    /// Venue rejected the order; trigger removed
    Failed(String),
    /// Order accepted; trigger kept until the position is confirmed open
    Submitted,
}

/// Consumes trade intents and submits them to the venue.
pub struct TradeExecutor {
    venue: Arc<dyn ExecutionVenue>,
    locks: TradeLockManager,
    monitors: Arc<MonitorStore>,
    notifier: ResultNotifier,
}

impl TradeExecutor {
    pub fn new(
        venue: Arc<dyn ExecutionVenue>,
        locks: TradeLockManager,
        monitors: Arc<MonitorStore>,
        notifier: ResultNotifier,
    ) -> Self {
        Self {
            venue,
            locks,
            monitors,
            notifier,
        }
    }

    /// Lock, check room, submit, record.
    ///
    /// The lock is not released afterwards; its expiry throttles repeat
    /// attempts on the same pair.
    pub async fn process(&self, intent: &TradeIntent) -> ExecutionOutcome {
        let pair = &intent.pair;
        let side = intent.direction;
        info!(%pair, %side, price = %intent.trigger_price, "Received trade intent");

        if !self.locks.acquire(pair).await {
            info!(%pair, "Trade lock held, another attempt is in flight");
            return ExecutionOutcome::LockHeld;
        }
        info!(%pair, ttl_secs = self.locks.ttl().as_secs(), "Trade lock acquired");

        if let Err(e) = self.check_position_room(pair).await {
            let reason = format!("{e:#}");
            warn!(%pair, %side, %reason, "Position check failed");
            self.monitors.delete(pair, side).await;
            self.notifier
                .notify(format!("❌ {pair} {side} skipped: position check failed - {reason}"));
            return ExecutionOutcome::PositionCheckFailed(reason);
        }

        match self.venue.submit_order(&intent.to_order()).await {
            Ok(()) => {
                let message = match intent.funding_rate {
                    Some(rate) => format!(
                        "✅ {pair} {side} submitted, price: {}, funding rate: {}%",
                        intent.trigger_price, rate
                    ),
                    None => format!("✅ {pair} {side} submitted, price: {}", intent.trigger_price),
                };
                info!(%pair, %side, price = %intent.trigger_price, "Order submitted");
                self.notifier.notify(message);
                ExecutionOutcome::Submitted
            }
            Err(e) => {
                let reason = format!("{e:#}");
                error!(%pair, %side, %reason, "Order submission failed");
                self.monitors.delete(pair, side).await;
                self.notifier
                    .notify(format!("❌ {pair} {side} failed: order rejected - {reason}"));
                ExecutionOutcome::Failed(reason)
            }
        }
    }

    /// Room under the ceiling and nothing open on `pair` yet.
    async fn check_position_room(&self, pair: &str) -> Result<()> {
        let count = self.venue.position_count().await?;
        if !count.has_room() {
            anyhow::bail!("max open trades reached ({}/{})", count.current, count.max);
        }
        if self.venue.has_open_position(pair).await? {
            anyhow::bail!("position already open on {}", pair);
        }
        Ok(())
    }

    /// Spawn `workers` tasks draining one shared queue until `shutdown`
    /// fires or every producer is gone. An intent already dequeued is
    /// processed to completion.
    pub fn spawn_workers(
        self: Arc<Self>,
        rx: mpsc::Receiver<TradeIntent>,
        workers: usize,
        shutdown: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let rx = Arc::new(Mutex::new(rx));
        (0..workers.max(1))
            .map(|worker| {
                let executor = self.clone();
                let rx = rx.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    info!(worker, "Trade executor started");
                    loop {
                        let next = tokio::select! {
                            _ = shutdown.cancelled() => break,
                            next = async { rx.lock().await.recv().await } => next,
                        };
                        let Some(intent) = next else { break };
                        executor.process(&intent).await;
                    }
                    info!(worker, "Trade executor stopped");
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{MockExecutionVenue, PaperVenue, PositionCount};
    use crate::monitor::Direction;
    use crate::store::MemoryStore;
    use crate::strategy::TradeDispatcher;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    const PAIR: &str = "BTC/USDT:USDT";

    struct Harness {
        executor: TradeExecutor,
        monitors: Arc<MonitorStore>,
        locks: TradeLockManager,
        notes: mpsc::Receiver<String>,
    }

    async fn harness(venue: Arc<dyn ExecutionVenue>) -> Harness {
        let durable = Arc::new(MemoryStore::new());
        let monitors = Arc::new(MonitorStore::new(durable.clone(), Duration::from_secs(3600)));
        let locks = TradeLockManager::new(durable, Duration::from_secs(120));
        let (notifier, notes) = ResultNotifier::channel(8);
        monitors.set(PAIR, Direction::Long, dec!(90)).await.unwrap();
        monitors.set(PAIR, Direction::Short, dec!(110)).await.unwrap();
        Harness {
            executor: TradeExecutor::new(venue, locks.clone(), monitors.clone(), notifier),
            monitors,
            locks,
            notes,
        }
    }

    fn roomy_venue() -> MockExecutionVenue {
        let mut venue = MockExecutionVenue::new();
        venue
            .expect_position_count()
            .returning(|| Ok(PositionCount { current: 1, max: 3 }));
        venue.expect_has_open_position().returning(|_| Ok(false));
        venue
    }

    #[tokio::test]
    async fn test_success_keeps_trigger_and_lock() {
        let mut venue = roomy_venue();
        venue.expect_submit_order().times(1).returning(|_| Ok(()));
        let mut h = harness(Arc::new(venue)).await;

        let intent = TradeIntent::short(PAIR, dec!(111), dec!(0.02));
        assert_eq!(h.executor.process(&intent).await, ExecutionOutcome::Submitted);

        let note = h.notes.try_recv().unwrap();
        assert!(note.contains("111"));
        assert!(note.contains("0.02"));
        assert!(h.monitors.get(PAIR, Direction::Short).is_some());

        // Lock is left to expire, so an immediate retry is throttled
        assert!(!h.locks.acquire(PAIR).await);
        assert_eq!(h.executor.process(&intent).await, ExecutionOutcome::LockHeld);
    }

    #[tokio::test]
    async fn test_failed_submission_removes_trigger() {
        let mut venue = roomy_venue();
        venue
            .expect_submit_order()
            .returning(|_| Err(anyhow::anyhow!("POST /api/v1/forcebuy failed with 502")));
        let mut h = harness(Arc::new(venue)).await;

        let outcome = h.executor.process(&TradeIntent::long(PAIR, dec!(80))).await;
        assert!(matches!(outcome, ExecutionOutcome::Failed(reason) if reason.contains("502")));
        assert!(h.monitors.get(PAIR, Direction::Long).is_none());
        assert!(h.monitors.get(PAIR, Direction::Short).is_some());
        assert!(h.notes.try_recv().unwrap().starts_with("❌"));
    }

    #[tokio::test]
    async fn test_ceiling_reached_removes_trigger_without_submitting() {
        let mut venue = MockExecutionVenue::new();
        venue
            .expect_position_count()
            .returning(|| Ok(PositionCount { current: 3, max: 3 }));
        venue.expect_submit_order().never();
        let mut h = harness(Arc::new(venue)).await;

        let outcome = h.executor.process(&TradeIntent::long(PAIR, dec!(80))).await;
        assert!(matches!(outcome, ExecutionOutcome::PositionCheckFailed(_)));
        assert!(h.monitors.get(PAIR, Direction::Long).is_none());
        assert!(h.notes.try_recv().unwrap().contains("position check failed"));
    }

    #[tokio::test]
    async fn test_existing_position_blocks_entry() {
        let venue = Arc::new(PaperVenue::new(5));
        let h = harness(venue.clone()).await;
        venue
            .submit_order(&TradeIntent::long(PAIR, dec!(1)).to_order())
            .await
            .unwrap();

        let outcome = h.executor.process(&TradeIntent::short(PAIR, dec!(120), dec!(0.01))).await;
        assert!(matches!(outcome, ExecutionOutcome::PositionCheckFailed(reason) if reason.contains("already open")));
        assert_eq!(venue.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_status_error_counts_as_failed_check() {
        let mut venue = MockExecutionVenue::new();
        venue
            .expect_position_count()
            .returning(|| Err(anyhow::anyhow!("connection refused")));
        venue.expect_submit_order().never();
        let h = harness(Arc::new(venue)).await;

        let outcome = h.executor.process(&TradeIntent::long(PAIR, dec!(80))).await;
        assert_eq!(
            outcome,
            ExecutionOutcome::PositionCheckFailed("connection refused".to_string())
        );
    }

    #[tokio::test]
    async fn test_workers_drain_queue_once_per_pair() {
        let venue = Arc::new(PaperVenue::new(5));
        let h = harness(venue.clone()).await;
        let executor = Arc::new(h.executor);
        let (dispatcher, rx) = TradeDispatcher::channel(16);
        let shutdown = CancellationToken::new();
        let workers = executor.spawn_workers(rx, 3, shutdown.clone());

        for _ in 0..5 {
            dispatcher.dispatch(TradeIntent::long(PAIR, dec!(80)));
        }
        dispatcher.dispatch(TradeIntent::long("ETH/USDT:USDT", dec!(2000)));
        drop(dispatcher);

        for worker in workers {
            worker.await.unwrap();
        }
        assert_eq!(venue.order_count().await, 2);
    }
}
