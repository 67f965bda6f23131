//! Fans watched quotes out to per-direction evaluation tasks.

use super::evaluator::SignalEvaluator;
use crate::market::Quote;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct QuoteRouter {
    evaluator: SignalEvaluator,
}

impl QuoteRouter {
    pub fn new(evaluator: SignalEvaluator) -> Self {
        Self { evaluator }
    }

    /// Spawn one short and one long evaluation per quote. No ordering is
    /// kept across pairs.
    pub async fn run(self, mut rx: mpsc::Receiver<Quote>, shutdown: CancellationToken) {
        info!("Quote router started");
        loop {
            let quote = tokio::select! {
                _ = shutdown.cancelled() => break,
                quote = rx.recv() => quote,
            };
            let Some(quote) = quote else { break };
            self.route(quote);
        }
        info!("Quote router stopped");
    }

    fn route(&self, quote: Quote) {
        let short = self.evaluator.clone();
        let long = self.evaluator.clone();
        let short_quote = quote.clone();
        tokio::spawn(async move {
            short.evaluate_short(&short_quote.pair, &short_quote).await;
        });
        tokio::spawn(async move {
            long.evaluate_long(&quote.pair, &quote).await;
        });
    }
}
