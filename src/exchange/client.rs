//! Binance futures REST client (public market data only).

use super::traits::{FundingRateSource, PriceSource};
use super::types::{BookTicker, PremiumIndex};
use crate::config::BinanceConfig;
use crate::market::Quote;
use crate::utils::to_exchange_symbol;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

/// Binance API client for the public futures endpoints.
#[derive(Debug, Clone)]
pub struct BinanceClient {
    http: Client,
    base_url: String,
}

impl BinanceClient {
    /// Create a new Binance client from configuration.
    pub fn new(config: &BinanceConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.futures_rest_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, symbol: &str) -> Result<T> {
        let url = format!("{}{}?symbol={}", self.base_url, path, urlencoding::encode(symbol));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to send GET {}", path))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error {} on GET {}: {}", status, url, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", path))
    }

    /// Premium index (mark price and last funding rate) for one pair.
    #[instrument(skip(self))]
    pub async fn get_premium_index(&self, pair: &str) -> Result<PremiumIndex> {
        self.get_json("/fapi/v1/premiumIndex", &to_exchange_symbol(pair))
            .await
    }

    /// Best bid/ask for one pair.
    #[instrument(skip(self))]
    pub async fn get_book_ticker(&self, pair: &str) -> Result<BookTicker> {
        self.get_json("/fapi/v1/ticker/bookTicker", &to_exchange_symbol(pair))
            .await
    }
}

/// Raw rate to percent: 0.0001 -> 0.01.
fn rate_to_percent(rate: Decimal) -> Decimal {
    rate * Decimal::ONE_HUNDRED
}

#[async_trait]
impl FundingRateSource for BinanceClient {
    async fn funding_rate(&self, pair: &str) -> Result<Decimal> {
        let index = self.get_premium_index(pair).await?;
        let percent = rate_to_percent(index.last_funding_rate);
        debug!(%pair, funding_rate = %percent, "Fetched funding rate");
        Ok(percent)
    }
}

#[async_trait]
impl PriceSource for BinanceClient {
    async fn current_quote(&self, pair: &str) -> Result<Quote> {
        let ticker = self.get_book_ticker(pair).await?;
        let observed_at = Some(ticker.time)
            .filter(|millis| *millis > 0)
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        Ok(Quote::new(pair, ticker.bid_price, ticker.ask_price, observed_at))
    }
}
