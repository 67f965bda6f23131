//! Turns quotes into trade intents.
//!
//! The evaluator is stateless between ticks: a qualifying trigger fires on
//! every quote until the executor, the reconciler or the user removes it.

use super::dispatch::{DispatchOutcome, TradeDispatcher, TradeIntent};
use crate::exchange::{FundingRateSource, OrderType};
use crate::market::Quote;
use crate::monitor::{Direction, MonitorStore};
use crate::notify::ResultNotifier;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of evaluating one direction for one quote.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// No actionable trigger for (pair, direction)
    NoTrigger,
    /// Trigger present, price condition not met
    NotTriggered,
    /// Short trigger met but the funding rate is at or below the threshold
    Suppressed { funding_rate: Decimal },
    /// Short trigger met but the funding rate lookup failed
    GateFailed,
    Dispatched(DispatchOutcome),
}

/// Applies trigger rules and the short-side funding gate.
#[derive(Clone)]
pub struct SignalEvaluator {
    monitors: Arc<MonitorStore>,
    dispatcher: TradeDispatcher,
    funding: Arc<dyn FundingRateSource>,
    notifier: ResultNotifier,
    funding_threshold: Decimal,
    order_type: OrderType,
}

impl SignalEvaluator {
    pub fn new(
        monitors: Arc<MonitorStore>,
        dispatcher: TradeDispatcher,
        funding: Arc<dyn FundingRateSource>,
        notifier: ResultNotifier,
        funding_threshold: Decimal,
    ) -> Self {
        Self {
            monitors,
            dispatcher,
            funding,
            notifier,
            funding_threshold,
            order_type: OrderType::Limit,
        }
    }

    /// Order type used for dispatched intents (limit by default).
    pub fn with_order_type(mut self, order_type: OrderType) -> Self {
        self.order_type = order_type;
        self
    }

    /// Short rule: ask above the limit, gated on the funding rate.
    pub async fn evaluate_short(&self, pair: &str, quote: &Quote) -> Evaluation {
        let Some(limit) = self.actionable_limit(pair, Direction::Short) else {
            return Evaluation::NoTrigger;
        };
        if quote.ask_price <= Decimal::ZERO || quote.ask_price <= limit {
            return Evaluation::NotTriggered;
        }

        let funding_rate = match self.funding.funding_rate(pair).await {
            Ok(rate) => rate,
            Err(e) => {
                warn!(%pair, error = %e, "Funding rate lookup failed, skipping short");
                self.notifier
                    .notify(format!("❌ {pair} short failed: funding rate lookup error - {e:#}"));
                return Evaluation::GateFailed;
            }
        };
        if funding_rate <= self.funding_threshold {
            info!(
                %pair,
                %funding_rate,
                threshold = %self.funding_threshold,
                "Funding rate at or below threshold, skipping short"
            );
            return Evaluation::Suppressed { funding_rate };
        }

        info!(
            %pair,
            observed_at = %quote.observed_at,
            ask = %quote.ask_price,
            %limit,
            %funding_rate,
            "Ask above short limit, dispatching"
        );
        let intent = TradeIntent::short(pair, quote.ask_price, funding_rate).with_order_type(self.order_type);
        Evaluation::Dispatched(self.dispatcher.dispatch(intent))
    }

    /// Long rule: bid below the limit, no gate.
    pub async fn evaluate_long(&self, pair: &str, quote: &Quote) -> Evaluation {
        let Some(limit) = self.actionable_limit(pair, Direction::Long) else {
            return Evaluation::NoTrigger;
        };
        if quote.bid_price <= Decimal::ZERO || quote.bid_price >= limit {
            return Evaluation::NotTriggered;
        }

        info!(
            %pair,
            observed_at = %quote.observed_at,
            bid = %quote.bid_price,
            %limit,
            "Bid below long limit, dispatching"
        );
        let intent = TradeIntent::long(pair, quote.bid_price).with_order_type(self.order_type);
        Evaluation::Dispatched(self.dispatcher.dispatch(intent))
    }

    /// Limit price of an entry that may trigger. Entries with a non-positive
    /// limit are treated as absent.
    fn actionable_limit(&self, pair: &str, direction: Direction) -> Option<Decimal> {
        let entry = self.monitors.get(pair, direction)?;
        if !entry.is_actionable() {
            debug!(%pair, %direction, limit = %entry.limit_price, "Ignoring non-positive limit");
            return None;
        }
        Some(entry.limit_price)
    }
}
