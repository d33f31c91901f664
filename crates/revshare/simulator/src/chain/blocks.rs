//! New-block notifications.

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::Ledger;

/// Publishes the latest observed block height to any number of watchers.
#[derive(Debug, Clone)]
pub struct BlockNotifier {
    sender: Arc<watch::Sender<u64>>,
}

impl BlockNotifier {
    /// Creates a notifier starting at `height`.
    pub fn new(height: u64) -> Self {
        let (sender, _) = watch::channel(height);
        Self { sender: Arc::new(sender) }
    }

    /// Returns a receiver that wakes on every new height.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.sender.subscribe()
    }

    /// Latest published height.
    pub fn latest(&self) -> u64 {
        *self.sender.borrow()
    }

    /// Publishes `height` if it is above the current one. Returns whether watchers were woken.
    pub fn publish(&self, height: u64) -> bool {
        self.sender.send_if_modified(|current| {
            if height > *current {
                *current = height;
                true
            } else {
                false
            }
        })
    }

    /// Polls `ledger` for the block number every `interval` until `cancel` fires.
    pub fn spawn_poller(
        &self,
        ledger: Arc<dyn Ledger>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let notifier = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("block poller stopped");
                        break;
                    }
                    _ = ticker.tick() => match ledger.block_number().await {
                        Ok(height) => {
                            if notifier.publish(height) {
                                trace!(height, "new block");
                            }
                        }
                        Err(err) => warn!(error = %err, "failed to poll block number"),
                    },
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::test_utils::FakeLedger;

    #[test]
    fn publish_only_moves_forward() {
        let notifier = BlockNotifier::new(10);
        assert!(!notifier.publish(10));
        assert!(!notifier.publish(9));
        assert!(notifier.publish(11));
        assert_eq!(notifier.latest(), 11);
    }

    #[tokio::test]
    async fn subscribers_observe_new_heights() {
        let notifier = BlockNotifier::new(0);
        let mut rx = notifier.subscribe();
        notifier.publish(3);
        rx.changed().await.expect("sender alive");
        assert_eq!(*rx.borrow_and_update(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_publishes_ledger_height() {
        let ledger = Arc::new(FakeLedger::new());
        ledger.block.store(42, Ordering::SeqCst);
        let notifier = BlockNotifier::new(0);
        let mut rx = notifier.subscribe();
        let cancel = CancellationToken::new();

        let handle = notifier.spawn_poller(ledger, Duration::from_secs(1), cancel.clone());
        rx.changed().await.expect("sender alive");
        assert_eq!(*rx.borrow(), 42);

        cancel.cancel();
        handle.await.expect("poller exits cleanly");
    }
}
