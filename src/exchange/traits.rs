//! Venue-agnostic interfaces consumed by the dispatch pipeline.
//!
//! The evaluator and executor only see these traits, so the live Freqtrade
//! and Binance clients, the paper venue and test doubles are interchangeable.

use crate::market::Quote;
use crate::monitor::Direction;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order type forwarded to the venue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    #[default]
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "limit",
            OrderType::Market => "market",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry order submitted to an execution venue.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub pair: String,
    pub price: Decimal,
    pub side: Direction,
    pub order_type: OrderType,
    pub entry_tag: String,
}

/// Open positions versus the venue's ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionCount {
    pub current: u32,
    pub max: u32,
}

impl PositionCount {
    pub fn has_room(&self) -> bool {
        self.current < self.max
    }
}

/// Venue trade as seen by the position reconciler.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenTrade {
    pub pair: String,
    pub direction: Direction,
    /// The entry order is no longer open on the exchange
    pub entry_filled: bool,
}

/// Order execution venue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    /// Submit an entry order.
    async fn submit_order(&self, order: &OrderRequest) -> anyhow::Result<()>;

    async fn position_count(&self) -> anyhow::Result<PositionCount>;

    /// Whether any trade is open on `pair`.
    async fn has_open_position(&self, pair: &str) -> anyhow::Result<bool>;

    async fn open_trades(&self) -> anyhow::Result<Vec<OpenTrade>>;

    /// Pairs the venue is currently willing to trade.
    async fn whitelist(&self) -> anyhow::Result<Vec<String>>;
}

/// Risk signal gating short entries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FundingRateSource: Send + Sync {
    /// Latest funding rate for `pair`, in percent.
    async fn funding_rate(&self, pair: &str) -> anyhow::Result<Decimal>;
}

/// On-demand quote lookup for processes without a live feed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn current_quote(&self, pair: &str) -> anyhow::Result<Quote>;
}
