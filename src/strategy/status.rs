//! Periodic overview of live triggers against the latest cached quotes.

use super::reconciler::spawn_periodic;
use crate::market::{Quote, QuoteCache, WatchedPairs};
use crate::monitor::{MonitorListing, MonitorStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// One trigger with the last quote seen for its pair.
#[derive(Debug, Clone)]
pub struct MonitorStatus {
    pub listing: MonitorListing,
    /// Zero sentinel when the pair was never quoted
    pub quote: Quote,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub monitors: Vec<MonitorStatus>,
    /// Cached quotes for watched pairs
    pub watched_quotes: Vec<Quote>,
    pub cached_quotes: usize,
}

/// Reads the monitor store and the quote cache for the status log.
pub struct StatusReporter {
    monitors: Arc<MonitorStore>,
    quotes: Arc<QuoteCache>,
    watched: Arc<WatchedPairs>,
}

impl StatusReporter {
    pub fn new(monitors: Arc<MonitorStore>, quotes: Arc<QuoteCache>, watched: Arc<WatchedPairs>) -> Self {
        Self {
            monitors,
            quotes,
            watched,
        }
    }

    pub async fn report(&self) -> StatusReport {
        let monitors = self
            .monitors
            .list_all(None)
            .await
            .into_iter()
            .map(|listing| MonitorStatus {
                quote: self.quotes.get(&listing.entry.pair),
                listing,
            })
            .collect();

        StatusReport {
            monitors,
            watched_quotes: self.quotes.get_all(&self.watched),
            cached_quotes: self.quotes.len(),
        }
    }

    fn log(report: &StatusReport) {
        info!(
            "📊 [STATUS] {} monitors | {} watched quotes ({} cached)",
            report.monitors.len(),
            report.watched_quotes.len(),
            report.cached_quotes
        );
        for status in &report.monitors {
            let entry = &status.listing.entry;
            if status.quote.is_empty() {
                info!(
                    "   {} {} | limit: {} | no price | expires: {}",
                    entry.pair, entry.direction, entry.limit_price, status.listing.ttl
                );
            } else {
                info!(
                    "   {} {} | limit: {} | bid: {} | ask: {} | mid: {} | expires: {}",
                    entry.pair,
                    entry.direction,
                    entry.limit_price,
                    status.quote.bid_price,
                    status.quote.ask_price,
                    status.quote.mid_price,
                    status.listing.ttl
                );
            }
        }
    }

    pub fn spawn(self: Arc<Self>, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        spawn_periodic("status_reporter", every, shutdown, move || {
            let reporter = self.clone();
            async move {
                Self::log(&reporter.report().await);
            }
        })
    }
}
