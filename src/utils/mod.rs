//! Shared helpers.

pub mod symbol;

pub use symbol::{format_pair_symbol, to_exchange_symbol};
