//! Background expiration sweep

use crate::cache::Index;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// A zero period cannot drive a timer
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Longer periods would overflow the timer's `Instant` arithmetic
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Handle to a running cleaner task
pub(crate) struct Cleaner {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Cleaner {
    /// Spawn the cleaner on the current tokio runtime
    pub(crate) fn spawn(index: Arc<Index>, period: Duration) -> Self {
        let period = period.clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(index, period, shutdown_rx));
        debug!(?period, "Cache cleaner started");

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal the cleaner and wait for it to exit
    pub(crate) async fn shutdown(self) {
        // Fails only when the task has already exited
        let _ = self.shutdown_tx.send(true);

        if let Err(e) = self.handle.await {
            warn!(error = %e, "Cache cleaner did not shut down cleanly");
        }
    }
}

async fn run(index: Arc<Index>, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // A closed channel (handle dropped) stops the loop just like a send
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            evicted = index.sweep_expired() => {
                if evicted > 0 {
                    debug!(evicted, "Swept expired cache entries");
                }
            }
        }
    }

    debug!("Cache cleaner stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_huge_period_keeps_cleaner_alive() {
        let cleaner = Cleaner::spawn(Arc::new(Index::new(Duration::ZERO)), Duration::MAX);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!cleaner.handle.is_finished());

        cleaner.shutdown_tx.send(true).unwrap();
        cleaner.handle.await.expect("cleaner should exit without panicking");
    }

    #[tokio::test]
    async fn test_zero_period_keeps_cleaner_alive() {
        let index = Arc::new(Index::new(Duration::ZERO));
        let cleaner = Cleaner::spawn(Arc::clone(&index), Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!cleaner.handle.is_finished());

        cleaner.shutdown().await;
    }
}
