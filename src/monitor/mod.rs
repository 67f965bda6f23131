//! Price trigger state.
//!
//! The in-memory map in [`MonitorStore`] is authoritative for live
//! decisioning. A durable replica with jittered expiry provides crash
//! recovery and cross-instance visibility; the replication listener folds
//! changes made by other instances back into the local map.
//!
//! [`TradeLockManager`] is the only cross-process mutual exclusion
//! primitive: a create-if-absent token per pair with a fixed expiry.

mod entry;
mod lock;
mod replication;
mod store;

pub use entry::{Direction, MonitorEntry, MONITOR_PREFIX};
pub use lock::{TradeLockManager, LOCK_PREFIX};
pub use store::{MonitorListing, MonitorStore, RemainingTtl};
