use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::worker::client::LeaseApi;

/// Terminal outcome reported by a [`HeartbeatAgent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseSignal {
    /// The coordinator says every token of the job has been released.
    JobCompleted,
    /// A heartbeat failed; the lease can no longer be trusted.
    Lost(String),
}

/// Background task that keeps one lease alive while the batch is processed.
///
/// The agent sends a HeartBeat every `interval` until it is stopped, the job
/// completes, or an RPC fails. The last two are published in a single-slot
/// channel the processing loop polls between tokens.
pub struct HeartbeatAgent {
    signal: watch::Receiver<Option<LeaseSignal>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatAgent {
    pub fn start<A: LeaseApi>(
        api: Arc<A>,
        job_id: impl Into<String>,
        lease_key: impl Into<String>,
        interval: Duration,
    ) -> Self {
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let job_id = job_id.into();
        let lease_key = lease_key.into();

        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let result = tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    result = api.heartbeat(&job_id, &lease_key) => result,
                };

                match result {
                    Ok(false) => {
                        tracing::trace!(job_id = %job_id, lease_key = %lease_key, "Heartbeat sent");
                    }
                    Ok(true) => {
                        tracing::debug!(job_id = %job_id, "Job completed, stopping heartbeat");
                        tx.send_replace(Some(LeaseSignal::JobCompleted));
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            job_id = %job_id,
                            lease_key = %lease_key,
                            error = %e,
                            "Heartbeat failed"
                        );
                        tx.send_replace(Some(LeaseSignal::Lost(e.to_string())));
                        break;
                    }
                }
            }
        });

        Self {
            signal: rx,
            cancel,
            handle: Some(handle),
        }
    }

    /// Latest terminal signal, if any. Stays set once published.
    pub fn check(&self) -> Option<LeaseSignal> {
        self.signal.borrow().clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the agent and wait for its task to exit.
    ///
    /// Returns promptly even when a heartbeat RPC is in flight.
    pub async fn close(mut self) -> Option<LeaseSignal> {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Heartbeat task panicked");
            }
        }
        self.check()
    }
}

impl Drop for HeartbeatAgent {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
