//! Latest-quote cache and the watched pair allow-list.
//!
//! Both structures are read on every tick and written by the feed or by
//! a periodic refresh, so each sits behind a single reader/writer lock that
//! is never held across an await point.

mod quote_cache;
mod watched;

pub use quote_cache::{Quote, QuoteCache};
pub use watched::WatchedPairs;
