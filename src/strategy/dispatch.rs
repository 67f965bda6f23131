//! Trade intents and the bounded, drop-on-full dispatch queue.

use crate::exchange::{OrderRequest, OrderType};
use crate::monitor::Direction;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Entry tag attached to every triggered order.
pub const ENTRY_TAG: &str = "force_buy";

/// "Conditions met, attempt an order" for one (pair, direction).
#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub pair: String,
    pub direction: Direction,
    /// Ask for shorts, bid for longs
    pub trigger_price: Decimal,
    pub order_type: OrderType,
    pub entry_tag: String,
    /// Funding rate (percent) seen by the short gate
    pub funding_rate: Option<Decimal>,
}

impl TradeIntent {
    pub fn short(pair: impl Into<String>, trigger_price: Decimal, funding_rate: Decimal) -> Self {
        Self {
            pair: pair.into(),
            direction: Direction::Short,
            trigger_price,
            order_type: OrderType::Limit,
            entry_tag: ENTRY_TAG.to_string(),
            funding_rate: Some(funding_rate),
        }
    }

    pub fn long(pair: impl Into<String>, trigger_price: Decimal) -> Self {
        Self {
            pair: pair.into(),
            direction: Direction::Long,
            trigger_price,
            order_type: OrderType::Limit,
            entry_tag: ENTRY_TAG.to_string(),
            funding_rate: None,
        }
    }

    pub fn with_order_type(mut self, order_type: OrderType) -> Self {
        self.order_type = order_type;
        self
    }

    pub fn to_order(&self) -> OrderRequest {
        OrderRequest {
            pair: self.pair.clone(),
            price: self.trigger_price,
            side: self.direction,
            order_type: self.order_type,
            entry_tag: self.entry_tag.clone(),
        }
    }
}

/// Result of a non-blocking dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Queued,
    /// Queue at capacity; the intent is discarded
    DroppedFull,
    /// No consumer left
    Closed,
}

/// Producer handle of the trade dispatch queue.
#[derive(Debug, Clone)]
pub struct TradeDispatcher {
    tx: mpsc::Sender<TradeIntent>,
}

impl TradeDispatcher {
    /// Create the queue with a fixed capacity.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TradeIntent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue without waiting. A full queue drops the intent; the next
    /// quote re-evaluates the trigger anyway.
    pub fn dispatch(&self, intent: TradeIntent) -> DispatchOutcome {
        match self.tx.try_send(intent) {
            Ok(()) => DispatchOutcome::Queued,
            Err(TrySendError::Full(intent)) => {
                warn!(
                    pair = %intent.pair,
                    direction = %intent.direction,
                    price = %intent.trigger_price,
                    "Trade queue full, dropping intent"
                );
                DispatchOutcome::DroppedFull
            }
            Err(TrySendError::Closed(intent)) => {
                debug!(pair = %intent.pair, "Trade queue closed");
                DispatchOutcome::Closed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_intent_defaults() {
        let intent = TradeIntent::long("BTC/USDT:USDT", dec!(80));
        assert_eq!(intent.entry_tag, "force_buy");
        assert_eq!(intent.order_type, OrderType::Limit);

        let order = TradeIntent::short("BTC/USDT:USDT", dec!(100), dec!(0.01)).to_order();
        assert_eq!(order.side, Direction::Short);
        assert_eq!(order.price, dec!(100));
    }

    #[tokio::test]
    async fn test_full_queue_never_delivers_extra_intent() {
        let (dispatcher, mut rx) = TradeDispatcher::channel(2);
        assert_eq!(dispatcher.dispatch(TradeIntent::long("A/USDT:USDT", dec!(1))), DispatchOutcome::Queued);
        assert_eq!(dispatcher.dispatch(TradeIntent::long("B/USDT:USDT", dec!(1))), DispatchOutcome::Queued);
        assert_eq!(
            dispatcher.dispatch(TradeIntent::long("C/USDT:USDT", dec!(1))),
            DispatchOutcome::DroppedFull
        );

        drop(dispatcher);
        let mut seen = Vec::new();
        while let Some(intent) = rx.recv().await {
            seen.push(intent.pair);
        }
        assert_eq!(seen, vec!["A/USDT:USDT", "B/USDT:USDT"]);
    }

    #[test]
    fn test_closed_queue() {
        let (dispatcher, rx) = TradeDispatcher::channel(1);
        drop(rx);
        assert_eq!(dispatcher.dispatch(TradeIntent::long("A/USDT:USDT", dec!(1))), DispatchOutcome::Closed);
    }
}
