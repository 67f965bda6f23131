//! Best-effort outbound result messages.
//!
//! A single bounded channel carries human-readable outcomes. Sends never
//! block: when the channel is full the message is dropped and logged.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Producer side of the notification channel.
#[derive(Debug, Clone)]
pub struct ResultNotifier {
    tx: mpsc::Sender<String>,
}

impl ResultNotifier {
    /// Create a notifier and the receiver to drain it.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a message without waiting. Returns whether it was queued.
    pub fn notify(&self, message: impl Into<String>) -> bool {
        match self.tx.try_send(message.into()) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!(%message, "Notification channel full, dropping message");
                false
            }
            Err(TrySendError::Closed(message)) => {
                debug!(%message, "Notification channel closed");
                false
            }
        }
    }
}

/// Write every notification to the log under target `notify` until
/// `shutdown` fires or all notifiers are dropped.
pub fn spawn_log_drain(mut rx: mpsc::Receiver<String>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => info!(target: "notify", "{}", message),
                    None => break,
                },
            }
        }
        // Flush what is already queued
        while let Ok(message) = rx.try_recv() {
            info!(target: "notify", "{}", message);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_channel_drops_without_blocking() {
        let (notifier, mut rx) = ResultNotifier::channel(1);
        assert!(notifier.notify("first"));
        assert!(!notifier.notify("second"));

        assert_eq!(rx.try_recv().unwrap(), "first");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_reports_failure() {
        let (notifier, rx) = ResultNotifier::channel(1);
        drop(rx);
        assert!(!notifier.notify("nobody listening"));
    }

    #[tokio::test]
    async fn test_drain_exits_when_notifiers_dropped() {
        let (notifier, rx) = ResultNotifier::channel(4);
        let drain = spawn_log_drain(rx, CancellationToken::new());
        notifier.notify("done");
        drop(notifier);
        tokio_test::assert_ok!(drain.await);
    }
}
