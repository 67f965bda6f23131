//! In-process paper venue for dry runs and tests.

use super::traits::{ExecutionVenue, OpenTrade, OrderRequest, PositionCount};
use crate::monitor::Direction;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Simulated position opened by a paper order.
#[derive(Debug, Clone)]
pub struct PaperTrade {
    pub trade_id: u64,
    pub pair: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub entry_tag: String,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct PaperState {
    trades: HashMap<String, PaperTrade>,
    order_count: u64,
}

/// Venue that fills every accepted order immediately.
pub struct PaperVenue {
    state: RwLock<PaperState>,
    max_open_trades: u32,
    whitelist: Vec<String>,
    reject_orders: AtomicBool,
    trade_id_counter: AtomicU64,
}

impl PaperVenue {
    pub fn new(max_open_trades: u32) -> Self {
        Self {
            state: RwLock::new(PaperState::default()),
            max_open_trades,
            whitelist: Vec::new(),
            reject_orders: AtomicBool::new(false),
            trade_id_counter: AtomicU64::new(1),
        }
    }

    /// Static whitelist reported to the refresher. Empty means watch all.
    pub fn with_whitelist(mut self, pairs: Vec<String>) -> Self {
        self.whitelist = pairs;
        self
    }

    /// Make every subsequent order fail.
    #[cfg(test)]
    pub fn set_reject_orders(&self, reject: bool) {
        self.reject_orders.store(reject, Ordering::SeqCst);
    }

    /// Close the simulated trade on `pair`. Returns whether one existed.
    #[cfg(test)]
    pub async fn close_trade(&self, pair: &str) -> bool {
        self.state.write().await.trades.remove(pair).is_some()
    }

    pub async fn trades(&self) -> Vec<PaperTrade> {
        let mut trades: Vec<PaperTrade> = self.state.read().await.trades.values().cloned().collect();
        trades.sort_by_key(|t| t.trade_id);
        trades
    }

    /// Number of accepted orders.
    #[cfg(test)]
    pub async fn order_count(&self) -> u64 {
        self.state.read().await.order_count
    }

    fn next_trade_id(&self) -> u64 {
        self.trade_id_counter.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionVenue for PaperVenue {
    async fn submit_order(&self, order: &OrderRequest) -> Result<()> {
        if self.reject_orders.load(Ordering::SeqCst) {
            anyhow::bail!("Paper venue rejected order for {}", order.pair);
        }

        let mut state = self.state.write().await;
        if state.trades.contains_key(&order.pair) {
            anyhow::bail!("Paper venue already has a trade on {}", order.pair);
        }
        if state.trades.len() as u32 >= self.max_open_trades {
            anyhow::bail!("Paper venue is at max open trades ({})", self.max_open_trades);
        }

        let trade = PaperTrade {
            trade_id: self.next_trade_id(),
            pair: order.pair.clone(),
            direction: order.side,
            entry_price: order.price,
            entry_tag: order.entry_tag.clone(),
            opened_at: Utc::now(),
        };
        info!(
            pair = %trade.pair,
            side = %trade.direction,
            price = %trade.entry_price,
            trade_id = trade.trade_id,
            "[PAPER] Order filled"
        );
        state.trades.insert(order.pair.clone(), trade);
        state.order_count += 1;
        Ok(())
    }

    async fn position_count(&self) -> Result<PositionCount> {
        let current = self.state.read().await.trades.len() as u32;
        Ok(PositionCount {
            current,
            max: self.max_open_trades,
        })
    }

    async fn has_open_position(&self, pair: &str) -> Result<bool> {
        Ok(self.state.read().await.trades.contains_key(pair))
    }

    async fn open_trades(&self) -> Result<Vec<OpenTrade>> {
        let trades = self.trades().await;
        debug!(count = trades.len(), "[PAPER] Open trades");
        Ok(trades
            .into_iter()
            .map(|t| OpenTrade {
                pair: t.pair,
                direction: t.direction,
                entry_filled: true,
            })
            .collect())
    }

    async fn whitelist(&self) -> Result<Vec<String>> {
        Ok(self.whitelist.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::OrderType;
    use rust_decimal_macros::dec;

    fn order(pair: &str, side: Direction) -> OrderRequest {
        OrderRequest {
            pair: pair.to_string(),
            price: dec!(100),
            side,
            order_type: OrderType::Limit,
            entry_tag: "force_buy".to_string(),
        }
    }

    #[tokio::test]
    async fn test_order_fills_immediately() {
        let venue = PaperVenue::new(3);
        venue.submit_order(&order("BTC/USDT:USDT", Direction::Short)).await.unwrap();

        assert!(venue.has_open_position("BTC/USDT:USDT").await.unwrap());
        assert_eq!(venue.position_count().await.unwrap(), PositionCount { current: 1, max: 3 });

        let trades = venue.open_trades().await.unwrap();
        assert_eq!(trades[0].direction, Direction::Short);
        assert!(trades[0].entry_filled);
    }

    #[tokio::test]
    async fn test_ceiling_and_duplicate_rejected() {
        let venue = PaperVenue::new(1);
        venue.submit_order(&order("BTC/USDT:USDT", Direction::Long)).await.unwrap();
        assert!(venue.submit_order(&order("BTC/USDT:USDT", Direction::Long)).await.is_err());
        assert!(venue.submit_order(&order("ETH/USDT:USDT", Direction::Long)).await.is_err());

        assert!(venue.close_trade("BTC/USDT:USDT").await);
        venue.submit_order(&order("ETH/USDT:USDT", Direction::Long)).await.unwrap();
        assert_eq!(venue.order_count().await, 2);
    }

    #[tokio::test]
    async fn test_forced_rejection() {
        let venue = PaperVenue::new(5).with_whitelist(vec!["BTC/USDT:USDT".to_string()]);
        venue.set_reject_orders(true);
        assert!(venue.submit_order(&order("BTC/USDT:USDT", Direction::Long)).await.is_err());
        assert!(venue.trades().await.is_empty());
        assert_eq!(venue.whitelist().await.unwrap().len(), 1);
    }
}
