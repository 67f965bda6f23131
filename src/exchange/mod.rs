//! Exchange integrations for the trigger monitor.
//!
//! ## Binance
//! - `!bookTicker` WebSocket stream feeding the quote cache
//! - Public REST endpoints for funding rates and on-demand quotes
//!
//! ## Freqtrade
//! REST API used as the execution venue: force entries, position counts,
//! open trades and the pair whitelist.
//!
//! ## Paper
//! In-process venue that fills every order immediately.

mod client;
mod freqtrade;
pub mod mock;
mod traits;
mod types;
mod websocket;

pub use client::BinanceClient;
pub use freqtrade::FreqtradeClient;
pub use mock::PaperVenue;
pub use traits::*;
pub use types::*;
pub use websocket::{quote_from_event, BookTickerFeed, FeedOutcome};
