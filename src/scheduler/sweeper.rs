use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::scheduler::lease::LeaseScheduler;

/// Periodically evicts old job records so abandoned job IDs do not pile up.
///
/// Records are judged by when the job started, not by its last heartbeat,
/// so a job still running after `retention` is evicted as well.
pub struct RegistrySweeper {
    scheduler: Arc<LeaseScheduler>,
    interval: Duration,
    retention: Duration,
}

impl RegistrySweeper {
    pub fn new(scheduler: Arc<LeaseScheduler>, interval: Duration, retention: Duration) -> Self {
        Self {
            scheduler,
            interval,
            retention,
        }
    }

    /// Sweep every `interval` until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            retention_secs = self.retention.as_secs(),
            "Registry sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Registry sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.scheduler.sweep(self.retention).await;
                }
            }
        }
    }
}
