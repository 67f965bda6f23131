//! Wire types for the Binance futures and Freqtrade REST/WebSocket APIs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ==================== Binance ====================

/// `!bookTicker` stream event.
#[derive(Debug, Clone, Deserialize)]
pub struct BookTickerEvent {
    #[serde(rename = "e", default)]
    pub event_type: String,
    #[serde(rename = "u", default)]
    pub update_id: i64,
    #[serde(rename = "E", default)]
    pub event_time: i64,
    /// Matching engine time in milliseconds
    #[serde(rename = "T", default)]
    pub transaction_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b")]
    pub bid_price: String,
    #[serde(rename = "B", default)]
    pub bid_qty: String,
    #[serde(rename = "a")]
    pub ask_price: String,
    #[serde(rename = "A", default)]
    pub ask_qty: String,
}

/// Best bid/ask from `GET /fapi/v1/ticker/bookTicker`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookTicker {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub bid_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub ask_price: Decimal,
    #[serde(default)]
    pub time: i64,
}

/// Mark price and funding data from `GET /fapi/v1/premiumIndex`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumIndex {
    pub symbol: String,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub mark_price: Option<Decimal>,
    /// Raw rate, e.g. "0.00010000" for 0.01%
    #[serde(with = "rust_decimal::serde::str")]
    pub last_funding_rate: Decimal,
    #[serde(default)]
    pub next_funding_time: i64,
}

// ==================== Freqtrade ====================

/// Response of `/api/v1/token/login` and `/api/v1/token/refresh`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Body of `POST /api/v1/forcebuy`.
#[derive(Debug, Clone, Serialize)]
pub struct ForceEntryPayload {
    pub pair: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub ordertype: String,
    /// "long" or "short"
    pub side: String,
    pub entry_tag: String,
}

/// Response of `GET /api/v1/count`.
#[derive(Debug, Clone, Deserialize)]
pub struct CountResponse {
    pub current: u32,
    pub max: u32,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub total_stake: Decimal,
}

/// One entry of `GET /api/v1/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeStatus {
    #[serde(default)]
    pub trade_id: i64,
    pub pair: String,
    #[serde(default)]
    pub is_open: bool,
    #[serde(default)]
    pub is_short: bool,
    #[serde(default)]
    pub orders: Vec<TradeOrder>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeOrder {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub ft_order_side: String,
    pub is_open: bool,
}

/// Response of `GET /api/v1/whitelist`.
#[derive(Debug, Clone, Deserialize)]
pub struct WhitelistResponse {
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub length: usize,
    #[serde(default)]
    pub method: Vec<String>,
}
