//! # Monitor Trade
//!
//! Price-trigger monitor that watches Binance futures quotes and turns
//! crossed triggers into force entries on a Freqtrade instance.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `market`: Latest-quote cache and the watched pair set
//! - `store`: Durable TTL key/value store (Redis or in-process)
//! - `monitor`: Trigger store, replication listener and trade locks
//! - `strategy`: Trigger evaluation, dispatch queue, execution, reconciliation
//! - `notify`: Human-readable result notifications
//! - `exchange`: Binance feed and REST client, Freqtrade client, paper venue
//! - `command`: Validated operator commands
//! - `utils`: Shared symbol helpers

pub mod command;
pub mod config;
pub mod exchange;
pub mod market;
pub mod monitor;
pub mod notify;
pub mod store;
pub mod strategy;
pub mod utils;

pub use config::Config;
