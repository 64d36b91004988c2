//! Throttled progress reporting.
//!
//! The encoder emits progress far faster than the record should be
//! written. A single-slot channel keeps only the latest value; a ticking
//! task drains it at the configured interval. Persisted values never go
//! backwards, and a failed write only logs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use mixtape_models::JobId;

use crate::services::JobStore;

/// Cheap handle the encode callback reports into.
#[derive(Clone)]
pub struct ProgressSink {
    tx: Arc<watch::Sender<u8>>,
}

impl ProgressSink {
    /// Record the latest percentage, clamped to 0-100. Overwrites any
    /// value the ticker has not drained yet.
    pub fn report(&self, percent: f64) {
        let clamped = percent.clamp(0.0, 100.0).round() as u8;
        self.tx.send_replace(clamped);
    }
}

/// The draining side of the reporter.
pub struct ProgressReporter {
    task: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Spawn the drain task and hand back the sink.
    ///
    /// The task exits once every sink clone is dropped, after flushing the
    /// final value.
    pub fn start(
        jobs: Arc<dyn JobStore>,
        owner_id: String,
        job_id: JobId,
        interval: Duration,
    ) -> (ProgressSink, Self) {
        let (tx, mut rx) = watch::channel(0u8);
        let sink = ProgressSink { tx: Arc::new(tx) };

        let task = tokio::spawn(async move {
            let mut last_written: u8 = 0;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let closed = rx.has_changed().is_err();
                let latest = *rx.borrow_and_update();

                if latest > last_written {
                    match jobs.update_progress(&owner_id, &job_id, latest).await {
                        Ok(()) => last_written = latest,
                        Err(e) => {
                            // Progress is best-effort; the render goes on.
                            warn!(job_id = %job_id, "Progress write failed: {}", e);
                        }
                    }
                }

                if closed {
                    break;
                }
            }
        });

        (sink, Self { task: Some(task) })
    }

    /// Wait for the drain task to flush and exit. Call after dropping the
    /// sink.
    pub async fn finish(mut self) {
        if let Some(task) = self.task.take() {
            task.await.ok();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
