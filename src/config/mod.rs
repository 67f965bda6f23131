//! Configuration management for the trigger monitor.
//!
//! Loads settings from environment variables and config files.

use crate::exchange::OrderType;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Durable store connection and monitor expiry
    #[serde(default)]
    pub redis: RedisConfig,
    /// Freqtrade REST API (execution venue)
    #[serde(default)]
    pub freqtrade: FreqtradeConfig,
    /// Binance futures market data
    #[serde(default)]
    pub binance: BinanceConfig,
    /// Signal evaluation and dispatch parameters
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL. `memory://` selects the in-process store.
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Database index, used to build the keyspace notification channel
    #[serde(default)]
    pub db: u32,
    /// Upper bound of the randomized monitor expiry in seconds.
    /// Actual expiry is drawn uniformly from [window / 2, window].
    #[serde(default = "default_key_expire_secs")]
    pub key_expire_secs: u64,
    /// Turn on keyspace notifications at startup when they are off
    #[serde(default = "default_true")]
    pub enable_keyspace_events: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreqtradeConfig {
    /// Base URL of the Freqtrade REST API
    #[serde(default = "default_freqtrade_url")]
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Access token refresh interval
    #[serde(default = "default_token_refresh_secs")]
    pub token_refresh_secs: u64,
    /// Pair whitelist refresh interval
    #[serde(default = "default_whitelist_refresh_secs")]
    pub whitelist_refresh_secs: u64,
    /// Open-trade reconciliation interval
    #[serde(default = "default_status_poll_secs")]
    pub status_poll_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    #[serde(default = "default_binance_rest_url")]
    pub futures_rest_url: String,
    #[serde(default = "default_binance_ws_url")]
    pub futures_ws_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Delay before reconnecting a dropped quote stream
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Short entries are suppressed when the funding rate (in percent)
    /// is at or below this value
    #[serde(default = "default_funding_rate_threshold")]
    pub funding_rate_threshold: Decimal,
    /// Capacity of the trade intent queue
    #[serde(default = "default_trade_queue_capacity")]
    pub trade_queue_capacity: usize,
    /// Capacity of the watched-quote queue between feed and evaluator
    #[serde(default = "default_quote_queue_capacity")]
    pub quote_queue_capacity: usize,
    /// Capacity of the outbound notification queue
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
    /// Trade lock expiry in seconds
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    /// Number of executor tasks draining the trade queue
    #[serde(default = "default_executor_workers")]
    pub executor_workers: usize,
    /// Pause before the replication listener resubscribes after a failure
    #[serde(default = "default_replication_backoff_ms")]
    pub replication_backoff_ms: u64,
    /// Route orders to the in-process paper venue instead of Freqtrade
    #[serde(default)]
    pub paper_trading: bool,
    /// Position ceiling of the paper venue
    #[serde(default = "default_paper_max_open_trades")]
    pub paper_max_open_trades: u32,
    /// Order type of triggered entries
    #[serde(default)]
    pub order_type: OrderType,
    /// Pairs the paper venue reports as its whitelist; empty watches all
    #[serde(default)]
    pub paper_whitelist: Vec<String>,
    /// Interval of the monitor/quote status report
    #[serde(default = "default_status_report_secs")]
    pub status_report_secs: u64,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

fn default_key_expire_secs() -> u64 {
    2_592_000 // 30 days
}

fn default_freqtrade_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_token_refresh_secs() -> u64 {
    600
}

fn default_whitelist_refresh_secs() -> u64 {
    60
}

fn default_status_poll_secs() -> u64 {
    30
}

fn default_binance_rest_url() -> String {
    "https://fapi.binance.com".to_string()
}

fn default_binance_ws_url() -> String {
    "wss://fstream.binance.com".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_funding_rate_threshold() -> Decimal {
    Decimal::new(-1, 1) // -0.1%
}

fn default_trade_queue_capacity() -> usize {
    500
}

fn default_quote_queue_capacity() -> usize {
    200
}

fn default_notification_capacity() -> usize {
    1000
}

fn default_lock_ttl_secs() -> u64 {
    120
}

fn default_executor_workers() -> usize {
    1
}

fn default_replication_backoff_ms() -> u64 {
    1000
}

fn default_paper_max_open_trades() -> u32 {
    5
}

fn default_status_report_secs() -> u64 {
    300
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("MONITOR"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        // Jittered expiry draws from [window / 2, window] in whole seconds
        anyhow::ensure!(
            self.redis.key_expire_secs >= 2,
            "key_expire_secs must be at least 2"
        );

        anyhow::ensure!(
            self.dispatch.trade_queue_capacity > 0
                && self.dispatch.quote_queue_capacity > 0
                && self.dispatch.notification_capacity > 0,
            "queue capacities must be positive"
        );

        anyhow::ensure!(
            self.dispatch.executor_workers >= 1,
            "executor_workers must be at least 1"
        );

        anyhow::ensure!(self.dispatch.lock_ttl_secs > 0, "lock_ttl_secs must be positive");

        anyhow::ensure!(
            self.freqtrade.whitelist_refresh_secs > 0
                && self.freqtrade.status_poll_secs > 0
                && self.freqtrade.token_refresh_secs > 0
                && self.dispatch.status_report_secs > 0,
            "periodic task intervals must be positive"
        );

        anyhow::ensure!(
            self.dispatch.paper_trading || !self.freqtrade.base_url.is_empty(),
            "freqtrade.base_url is required unless paper_trading is enabled"
        );

        Ok(())
    }
}

impl RedisConfig {
    pub fn expiry_window(&self) -> Duration {
        Duration::from_secs(self.key_expire_secs)
    }
}

impl DispatchConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn replication_backoff(&self) -> Duration {
        Duration::from_millis(self.replication_backoff_ms)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            db: 0,
            key_expire_secs: default_key_expire_secs(),
            enable_keyspace_events: true,
        }
    }
}

impl Default for FreqtradeConfig {
    fn default() -> Self {
        Self {
            base_url: default_freqtrade_url(),
            username: String::new(),
            password: String::new(),
            request_timeout_secs: default_request_timeout(),
            token_refresh_secs: default_token_refresh_secs(),
            whitelist_refresh_secs: default_whitelist_refresh_secs(),
            status_poll_secs: default_status_poll_secs(),
        }
    }
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            futures_rest_url: default_binance_rest_url(),
            futures_ws_url: default_binance_ws_url(),
            request_timeout_secs: default_request_timeout(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            funding_rate_threshold: default_funding_rate_threshold(),
            trade_queue_capacity: default_trade_queue_capacity(),
            quote_queue_capacity: default_quote_queue_capacity(),
            notification_capacity: default_notification_capacity(),
            lock_ttl_secs: default_lock_ttl_secs(),
            executor_workers: default_executor_workers(),
            replication_backoff_ms: default_replication_backoff_ms(),
            paper_trading: false,
            paper_max_open_trades: default_paper_max_open_trades(),
            order_type: OrderType::Limit,
            paper_whitelist: Vec::new(),
            status_report_secs: default_status_report_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatch.funding_rate_threshold, dec!(-0.1));
        assert_eq!(config.dispatch.lock_ttl(), Duration::from_secs(120));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = Config::default();
        config.dispatch.trade_queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.dispatch.status_report_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.redis.key_expire_secs = 1;
        assert!(config.validate().is_err());
    }
}
