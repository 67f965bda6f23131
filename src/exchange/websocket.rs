//! Binance futures `!bookTicker` feed.
//!
//! Every USDT-margined quote is written to the [`QuoteCache`]; quotes for
//! watched pairs are also forwarded to the evaluation queue without blocking.

use super::types::BookTickerEvent;
use crate::config::BinanceConfig;
use crate::market::{Quote, QuoteCache, WatchedPairs};
use crate::utils::format_pair_symbol;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SETTLE_SUFFIX: &str = "USDT";

/// What happened to one stream message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Not a USDT-margined symbol
    Ignored,
    /// Cached but the pair is not watched
    Cached,
    Forwarded,
    /// Cached, but the evaluation queue was full or closed
    Dropped,
    Malformed,
}

/// Streaming bookTicker client with automatic reconnect.
pub struct BookTickerFeed {
    url: String,
    reconnect_delay: Duration,
    quotes: Arc<QuoteCache>,
    watched: Arc<WatchedPairs>,
    tx: mpsc::Sender<Quote>,
}

impl BookTickerFeed {
    pub fn new(
        config: &BinanceConfig,
        quotes: Arc<QuoteCache>,
        watched: Arc<WatchedPairs>,
        tx: mpsc::Sender<Quote>,
    ) -> Self {
        Self {
            url: format!("{}/ws/!bookTicker", config.futures_ws_url.trim_end_matches('/')),
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
            quotes,
            watched,
            tx,
        }
    }

    /// Stream until `shutdown` fires, reconnecting after every disconnect.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.stream_once() => match result {
                    Ok(()) => warn!("Quote stream ended"),
                    Err(e) => error!(error = %e, "Quote stream failed"),
                },
            }

            info!(delay_secs = self.reconnect_delay.as_secs(), "Reconnecting quote stream");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
        info!("Quote feed stopped");
    }

    /// One connection lifetime.
    async fn stream_once(&self) -> Result<()> {
        info!("Connecting to WebSocket: {}", self.url);
        let (mut ws_stream, _) = connect_async(&self.url)
            .await
            .context("Failed to connect to WebSocket")?;
        info!("Quote stream connected");

        while let Some(msg) = ws_stream.next().await {
            match msg.context("WebSocket read error")? {
                Message::Text(text) => {
                    self.handle_message(&text.to_string());
                }
                Message::Ping(_) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Received ping");
                }
                Message::Close(frame) => {
                    info!(?frame, "WebSocket closed by server");
                    return Ok(());
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Parse, cache and maybe forward one raw stream message.
    pub fn handle_message(&self, text: &str) -> FeedOutcome {
        let event: BookTickerEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "Unparseable bookTicker message");
                return FeedOutcome::Malformed;
            }
        };
        if !event.symbol.ends_with(SETTLE_SUFFIX) {
            return FeedOutcome::Ignored;
        }

        let quote = match quote_from_event(&event) {
            Ok(quote) => quote,
            Err(e) => {
                warn!(symbol = %event.symbol, error = %e, "Failed to convert quote");
                return FeedOutcome::Malformed;
            }
        };

        self.quotes.update(&quote.pair, quote.clone());
        if !self.watched.contains(&quote.pair) {
            return FeedOutcome::Cached;
        }

        match self.tx.try_send(quote) {
            Ok(()) => FeedOutcome::Forwarded,
            Err(TrySendError::Full(quote)) => {
                warn!(pair = %quote.pair, "Quote queue full, skipping update");
                FeedOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => FeedOutcome::Dropped,
        }
    }
}

/// Build a [`Quote`] from a stream event. `observed_at` is the matching
/// engine time when present, otherwise now.
pub fn quote_from_event(event: &BookTickerEvent) -> Result<Quote> {
    let bid = Decimal::from_str(&event.bid_price)
        .with_context(|| format!("Invalid bid price: {}", event.bid_price))?;
    let ask = Decimal::from_str(&event.ask_price)
        .with_context(|| format!("Invalid ask price: {}", event.ask_price))?;

    let observed_at = Some(event.transaction_time)
        .filter(|millis| *millis > 0)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    Ok(Quote::new(format_pair_symbol(&event.symbol), bid, ask, observed_at))
}
