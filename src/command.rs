//! Operator command front end.
//!
//! Inputs are validated here before they reach the monitor store. Every
//! command returns a human-readable reply; invalid input is an error.

use crate::exchange::PriceSource;
use crate::monitor::{Direction, MonitorStore, TradeLockManager};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Settle suffix appended to bare symbols.
pub const DEFAULT_SETTLE_SUFFIX: &str = "/USDT:USDT";

/// Upper-case the pair and append the USDT settle suffix when missing.
pub fn normalize_pair(raw: &str) -> Result<String> {
    let pair = raw.trim().to_uppercase();
    if pair.is_empty() {
        anyhow::bail!("pair must not be empty");
    }
    if pair.ends_with(DEFAULT_SETTLE_SUFFIX) {
        return Ok(pair);
    }
    Ok(format!("{pair}{DEFAULT_SETTLE_SUFFIX}"))
}

/// Parse a strictly positive limit price.
pub fn parse_price(raw: &str) -> Result<Decimal> {
    let price = Decimal::from_str(raw.trim()).with_context(|| format!("invalid price: {raw}"))?;
    if price <= Decimal::ZERO {
        anyhow::bail!("price must be greater than zero, got {price}");
    }
    Ok(price)
}

pub fn parse_direction(raw: &str) -> Result<Direction> {
    raw.parse::<Direction>()
        .map_err(|_| anyhow::anyhow!("invalid direction: {raw}, use 'long' or 'short'"))
}

/// Executes operator commands against a shared durable store.
pub struct CommandHandler {
    monitors: Arc<MonitorStore>,
    locks: TradeLockManager,
    prices: Arc<dyn PriceSource>,
}

impl CommandHandler {
    pub fn new(monitors: Arc<MonitorStore>, locks: TradeLockManager, prices: Arc<dyn PriceSource>) -> Self {
        Self {
            monitors,
            locks,
            prices,
        }
    }

    /// Create or replace a trigger.
    ///
    /// A limit the market has already crossed is rejected: a short below
    /// the current mid or a long above it would fire on the next tick.
    pub async fn set(&self, pair: &str, direction: &str, price: &str) -> Result<String> {
        let pair = normalize_pair(pair)?;
        let direction = parse_direction(direction)?;
        let limit = parse_price(price)?;

        let quote = self
            .prices
            .current_quote(&pair)
            .await
            .with_context(|| format!("failed to fetch current price for {pair}"))?;
        let current = quote.mid_price;
        if current <= Decimal::ZERO {
            anyhow::bail!("no price for {pair}, check that the pair exists");
        }
        match direction {
            Direction::Short if current > limit => {
                anyhow::bail!("current price {current} is above the short limit {limit}, adjust the limit")
            }
            Direction::Long if current < limit => {
                anyhow::bail!("current price {current} is below the long limit {limit}, adjust the limit")
            }
            _ => {}
        }

        // Pick up entries written by other instances before comparing
        if let Err(e) = self.monitors.load_from_durable_store().await {
            warn!(error = %e, "Could not load monitors before set");
        }
        let previous = self.monitors.get(&pair, direction).filter(|e| e.is_actionable());

        self.monitors
            .set(&pair, direction, limit)
            .await
            .with_context(|| format!("failed to persist {pair} {direction} monitor"))?;
        info!(%pair, %direction, %limit, "Monitor set");

        let mut reply = match previous {
            Some(old) => format!(
                "🟢 {pair} {direction} monitor, new limit: {limit}, old limit: {}",
                old.limit_price
            ),
            None => format!("🟢 {pair} {direction} monitor, limit: {limit}"),
        };
        let _ = write!(reply, ", current price: {current}");
        Ok(reply)
    }

    pub async fn cancel(&self, pair: &str, direction: &str) -> Result<String> {
        let pair = normalize_pair(pair)?;
        let direction = parse_direction(direction)?;
        self.monitors.delete(&pair, direction).await;
        info!(%pair, %direction, "Monitor cancelled");
        Ok(format!("✅ {pair} {direction} monitor cancelled"))
    }

    /// Entries with the remaining lifetime of their replica.
    pub async fn list(&self, direction: Option<&str>) -> Result<String> {
        let filter = direction.map(parse_direction).transpose()?;
        self.monitors
            .load_from_durable_store()
            .await
            .context("failed to load monitors")?;

        let listings = self.monitors.list_all(filter).await;
        if listings.is_empty() {
            return Ok("No monitors".to_string());
        }
        let mut reply = String::new();
        for listing in listings {
            let entry = &listing.entry;
            let _ = writeln!(
                reply,
                "{:<24} {:<5} {:>16}  {}",
                entry.pair, entry.direction, entry.limit_price, listing.ttl
            );
        }
        Ok(reply)
    }

    /// Current best bid/ask and mid for a pair.
    pub async fn price(&self, pair: &str) -> Result<String> {
        let pair = normalize_pair(pair)?;
        let quote = self.prices.current_quote(&pair).await?;
        if quote.is_empty() {
            anyhow::bail!("no price for {pair}, check that the pair exists");
        }
        Ok(format!(
            "{pair} bid: {}, ask: {}, current price: {}",
            quote.bid_price, quote.ask_price, quote.mid_price
        ))
    }

    /// Release a pair's trade lock before it expires.
    pub async fn unlock(&self, pair: &str) -> Result<String> {
        let pair = normalize_pair(pair)?;
        self.locks
            .release(&pair)
            .await
            .with_context(|| format!("failed to release trade lock for {pair}"))?;
        info!(%pair, "Trade lock released");
        Ok(format!("🔓 {pair} trade lock released"))
    }
}
