//! Last-write-wins quote storage.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

use super::WatchedPairs;

/// Best bid/ask observation for a pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub pair: String,
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    /// (bid + ask) / 2
    pub mid_price: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(
        pair: impl Into<String>,
        bid_price: Decimal,
        ask_price: Decimal,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            pair: pair.into(),
            bid_price,
            ask_price,
            mid_price: (bid_price + ask_price) / Decimal::TWO,
            observed_at,
        }
    }

    /// Zero-value sentinel returned for pairs that were never quoted.
    pub fn empty(pair: impl Into<String>) -> Self {
        Self {
            pair: pair.into(),
            bid_price: Decimal::ZERO,
            ask_price: Decimal::ZERO,
            mid_price: Decimal::ZERO,
            observed_at: DateTime::<Utc>::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bid_price.is_zero() && self.ask_price.is_zero()
    }
}

/// Holds the most recent quote per pair.
///
/// Updates are unconditional: an out-of-order message can overwrite a
/// fresher one. No history is kept.
#[derive(Debug, Default)]
pub struct QuoteCache {
    quotes: RwLock<HashMap<String, Quote>>,
}

impl QuoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored quote for `pair`.
    pub fn update(&self, pair: &str, quote: Quote) {
        self.quotes.write().insert(pair.to_string(), quote);
    }

    /// Last quote for `pair`, or [`Quote::empty`] if none was seen.
    pub fn get(&self, pair: &str) -> Quote {
        self.quotes
            .read()
            .get(pair)
            .cloned()
            .unwrap_or_else(|| Quote::empty(pair))
    }

    /// All cached quotes whose pair is watched (everything when the watch
    /// set is empty).
    pub fn get_all(&self, watched: &WatchedPairs) -> Vec<Quote> {
        let quotes = self.quotes.read();
        let mut result: Vec<Quote> = quotes
            .values()
            .filter(|q| watched.contains(&q.pair))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.pair.cmp(&b.pair));
        result
    }

    pub fn len(&self) -> usize {
        self.quotes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_mid_price_is_derived() {
        let quote = Quote::new("BTC/USDT:USDT", dec!(99), dec!(101), Utc::now());
        assert_eq!(quote.mid_price, dec!(100));
    }

    #[test]
    fn test_get_unknown_pair_returns_sentinel() {
        let cache = QuoteCache::new();
        let quote = cache.get("ETH/USDT:USDT");
        assert!(quote.is_empty());
        assert_eq!(quote.pair, "ETH/USDT:USDT");
    }

    #[test]
    fn test_update_is_last_write_wins() {
        let cache = QuoteCache::new();
        let now = Utc::now();
        cache.update("BTC/USDT:USDT", Quote::new("BTC/USDT:USDT", dec!(10), dec!(11), now));
        // Older observation still overwrites the newer one
        let stale = now - Duration::seconds(30);
        cache.update("BTC/USDT:USDT", Quote::new("BTC/USDT:USDT", dec!(9), dec!(10), stale));

        let quote = cache.get("BTC/USDT:USDT");
        assert_eq!(quote.bid_price, dec!(9));
        assert_eq!(quote.observed_at, stale);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_all_respects_watch_set() {
        let cache = QuoteCache::new();
        let now = Utc::now();
        for pair in ["BTC/USDT:USDT", "ETH/USDT:USDT", "SOL/USDT:USDT"] {
            cache.update(pair, Quote::new(pair, dec!(1), dec!(2), now));
        }

        let watched = WatchedPairs::new();
        assert_eq!(cache.get_all(&watched).len(), 3);

        watched.replace(vec!["ETH/USDT:USDT".to_string()]);
        let quotes = cache.get_all(&watched);
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].pair, "ETH/USDT:USDT");
    }
}
