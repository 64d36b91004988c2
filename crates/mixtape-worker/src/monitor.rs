//! Cooperative cancellation.
//!
//! One `CancelSignal` is shared by everything that can stop the run: the
//! pre-flight status read, the live subscription forwarder and the encoder.
//! The signal only ever flips false to true.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use mixtape_models::{JobId, JobStatus};

use crate::error::WorkerResult;
use crate::services::{JobStore, StatusSubscription};

/// Shared cancellation flag.
#[derive(Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Flip the flag. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// A receiver for select-style waits (the encoder takes one of these).
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Watches the job record and trips the cancel signal when an external
/// actor flips the status to `cancelled`.
pub struct CancellationMonitor {
    subscription: Option<StatusSubscription>,
    forwarder: Option<JoinHandle<()>>,
}

impl CancellationMonitor {
    /// Pre-flight status read followed by a live subscription.
    ///
    /// If the record is already cancelled at start, the signal trips
    /// immediately and no subscription is opened.
    pub async fn start(
        jobs: &Arc<dyn JobStore>,
        owner_id: &str,
        job_id: &JobId,
        poll_interval: Duration,
        signal: CancelSignal,
    ) -> WorkerResult<Self> {
        if jobs.status(owner_id, job_id).await? == Some(JobStatus::Cancelled) {
            info!(job_id = %job_id, "Job already cancelled before start");
            signal.trigger();
            return Ok(Self {
                subscription: None,
                forwarder: None,
            });
        }

        let subscription = jobs.subscribe_status(owner_id, job_id, poll_interval).await?;
        let mut receiver = subscription.receiver.clone();
        let job = job_id.clone();

        let forwarder = tokio::spawn(async move {
            // Check the seeded value first, then follow changes.
            loop {
                if *receiver.borrow_and_update() == JobStatus::Cancelled {
                    info!(job_id = %job, "Cancellation observed, signalling abort");
                    signal.trigger();
                    break;
                }
                if receiver.changed().await.is_err() {
                    debug!(job_id = %job, "Status feed closed");
                    break;
                }
            }
        });

        Ok(Self {
            subscription: Some(subscription),
            forwarder: Some(forwarder),
        })
    }

    /// Tear down the subscription and the forwarding task.
    pub fn stop(mut self) {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

impl Drop for CancellationMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_starts_clear() {
        let signal = CancelSignal::new();
        assert!(!signal.is_cancelled());
    }

    #[test]
    fn test_trigger_is_idempotent() {
        let signal = CancelSignal::new();
        signal.trigger();
        signal.trigger();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_subscribers_observe_trigger() {
        let signal = CancelSignal::new();
        let mut rx = signal.subscribe();
        signal.trigger();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
