//! Trigger evaluation and order execution.
//!
//! Contains the core logic for:
//! - Evaluating quotes against short and long triggers
//! - Queueing trade intents without blocking the feed
//! - Lock-guarded order submission
//! - Reconciling triggers with the venue's open positions
//! - Periodic status report of triggers against cached quotes

mod dispatch;
mod evaluator;
mod executor;
mod reconciler;
mod router;
mod status;

pub use dispatch::{DispatchOutcome, TradeDispatcher, TradeIntent, ENTRY_TAG};
pub use evaluator::{Evaluation, SignalEvaluator};
pub use executor::{ExecutionOutcome, TradeExecutor};
pub use reconciler::{refresh_whitelist, spawn_whitelist_refresher, PositionReconciler};
pub use router::QuoteRouter;
pub use status::{MonitorStatus, StatusReport, StatusReporter};
