//! Applies durable-store change notifications to the local monitor map.

use super::entry::{parse_durable_key, MonitorEntry, MONITOR_PREFIX};
use super::store::MonitorStore;
use crate::store::{KeyEvent, KeyEventKind, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl MonitorStore {
    /// Keep the local map in sync with changes made by other instances.
    ///
    /// Runs until `shutdown` fires. Every successful subscription, the
    /// first included, is followed by a full reload so writes and deletes
    /// made while unsubscribed are not lost. A lost subscription is
    /// re-established after `backoff`.
    pub async fn run_replication(self: Arc<Self>, backoff: Duration, shutdown: CancellationToken) {
        info!("Monitor replication listener started");

        'subscribe: loop {
            let subscription = tokio::select! {
                _ = shutdown.cancelled() => break 'subscribe,
                result = self.durable.subscribe(MONITOR_PREFIX) => result,
            };

            match subscription {
                Ok(mut events) => {
                    if let Err(e) = self.load_from_durable_store().await {
                        warn!(error = %e, "Reload after subscribe failed");
                    }

                    loop {
                        let event = tokio::select! {
                            _ = shutdown.cancelled() => break 'subscribe,
                            event = events.recv() => event,
                        };
                        let Some(event) = event else {
                            warn!("Monitor change subscription closed");
                            break;
                        };

                        if let Err(e) = self.apply_event(&event).await {
                            warn!(key = %event.key, error = %e, "Failed to apply monitor change");
                            tokio::select! {
                                _ = shutdown.cancelled() => break 'subscribe,
                                _ = tokio::time::sleep(backoff) => {}
                            }
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Failed to subscribe to monitor changes"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break 'subscribe,
                _ = tokio::time::sleep(backoff) => {}
            }
        }

        info!("Monitor replication listener stopped");
    }

    /// Apply one change notification.
    ///
    /// Only a failed durable read is an error; unparseable keys and records
    /// are skipped.
    pub(crate) async fn apply_event(&self, event: &KeyEvent) -> StoreResult<()> {
        let (pair, direction) = match parse_durable_key(&event.key) {
            Ok(parsed) => parsed,
            Err(_) => {
                debug!(key = %event.key, "Ignoring change for unrecognized key");
                return Ok(());
            }
        };

        match &event.kind {
            KeyEventKind::Set => match self.durable.get(&event.key).await? {
                Some(value) => match MonitorEntry::from_record(&event.key, &value) {
                    Ok(entry) => {
                        debug!(%pair, %direction, price = %entry.limit_price, "Replicated monitor");
                        self.merge(entry);
                    }
                    Err(e) => warn!(key = %event.key, error = %e, "Skipping malformed monitor record"),
                },
                // Deleted again before we could read it
                None => {
                    self.remove_local(&pair, direction);
                }
            },
            KeyEventKind::Deleted | KeyEventKind::Expired => {
                self.remove_local(&pair, direction);
            }
            KeyEventKind::Other(op) => debug!(key = %event.key, %op, "Ignoring keyspace event"),
        }
        Ok(())
    }
}
