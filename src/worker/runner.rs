use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::error::{LeaseError, Result};
use crate::scheduler::Batch;
use crate::worker::client::LeaseApi;
use crate::worker::heartbeat::{HeartbeatAgent, LeaseSignal};
use crate::worker::processor::TokenProcessor;

/// Totals for one worker run.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub batches_accepted: usize,
    pub batches_rejected: usize,
    pub batches_abandoned: usize,
    /// Tokens whose batch was accepted by the coordinator
    pub tokens_processed: usize,
    /// Output records of accepted batches, in processing order
    pub records: Vec<String>,
    pub output_path: Option<PathBuf>,
}

#[derive(Debug)]
enum BatchOutcome {
    Finished(Vec<String>),
    Lost(String),
    JobCompleted,
    Failed(String),
    Interrupted,
}

/// Drives the Get → heartbeat → process → Done loop for one job.
pub struct BatchRunner<A, P> {
    api: Arc<A>,
    processor: P,
    config: WorkerConfig,
}

impl<A: LeaseApi, P: TokenProcessor> BatchRunner<A, P> {
    pub fn new(api: Arc<A>, processor: P, config: WorkerConfig) -> Self {
        Self {
            api,
            processor,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run up to `num_batches` batches, then write the accepted records.
    ///
    /// Stops early when the coordinator has nothing left, the job completes,
    /// or `shutdown` is cancelled.
    pub async fn run(&self, shutdown: &CancellationToken) -> Result<RunSummary> {
        self.config.validate().map_err(LeaseError::InvalidConfig)?;

        let job_id = self.config.job_id.as_str();
        let mut summary = RunSummary::default();

        tracing::info!(
            job_id,
            batch_size = self.config.batch_size,
            num_batches = self.config.num_batches,
            "Worker starting"
        );

        for round in 0..self.config.num_batches {
            if shutdown.is_cancelled() {
                tracing::info!(job_id, "Shutdown requested, stopping worker");
                break;
            }

            let batch = self.api.get(job_id, self.config.batch_size).await?;
            if batch.is_empty() {
                tracing::info!(job_id, round, "No tokens left to lease");
                break;
            }
            let lease_key = batch.lease_key.clone();
            tracing::debug!(job_id, lease_key = %lease_key, tokens = batch.len(), "Leased batch");

            let agent = HeartbeatAgent::start(
                self.api.clone(),
                job_id,
                lease_key.clone(),
                self.config.heartbeat_interval(),
            );
            let outcome = self.process_batch(batch, &agent, shutdown).await;
            agent.close().await;

            match outcome {
                BatchOutcome::Finished(records) => {
                    if self.api.done(job_id, &lease_key).await? {
                        summary.batches_accepted += 1;
                        summary.tokens_processed += records.len();
                        summary.records.extend(records);
                    } else {
                        tracing::warn!(
                            job_id,
                            lease_key = %lease_key,
                            "Lease no longer held, discarding batch results"
                        );
                        summary.batches_rejected += 1;
                    }
                }
                BatchOutcome::Lost(reason) => {
                    tracing::warn!(job_id, lease_key = %lease_key, reason = %reason, "Lease lost, abandoning batch");
                    summary.batches_abandoned += 1;
                }
                BatchOutcome::Failed(reason) => {
                    tracing::error!(job_id, lease_key = %lease_key, reason = %reason, "Processing failed, abandoning batch");
                    summary.batches_abandoned += 1;
                }
                BatchOutcome::JobCompleted => {
                    tracing::info!(job_id, "Job completed elsewhere, stopping worker");
                    summary.batches_abandoned += 1;
                    break;
                }
                BatchOutcome::Interrupted => {
                    tracing::info!(job_id, lease_key = %lease_key, "Shutdown requested mid-batch");
                    summary.batches_abandoned += 1;
                    break;
                }
            }
        }

        summary.output_path = write_output(&self.config.out_dir, job_id, &summary.records).await?;

        tracing::info!(
            job_id,
            accepted = summary.batches_accepted,
            rejected = summary.batches_rejected,
            abandoned = summary.batches_abandoned,
            tokens = summary.tokens_processed,
            "Worker finished"
        );
        Ok(summary)
    }

    async fn process_batch(
        &self,
        batch: Batch,
        agent: &HeartbeatAgent,
        shutdown: &CancellationToken,
    ) -> BatchOutcome {
        let mut records = Vec::with_capacity(batch.len());
        for token in &batch.tokens {
            if shutdown.is_cancelled() {
                return BatchOutcome::Interrupted;
            }
            match agent.check() {
                Some(LeaseSignal::Lost(reason)) => return BatchOutcome::Lost(reason),
                Some(LeaseSignal::JobCompleted) => return BatchOutcome::JobCompleted,
                None => {}
            }
            match self.processor.process(token).await {
                Ok(record) => records.push(record),
                Err(e) => return BatchOutcome::Failed(format!("{}: {}", token, e)),
            }
        }
        match agent.check() {
            Some(LeaseSignal::Lost(reason)) => BatchOutcome::Lost(reason),
            _ => BatchOutcome::Finished(records),
        }
    }
}

/// Write `records` one per line to `<out_dir>/<job_id>/<job_id>_<hex-nanos>.json`.
///
/// Returns `None` without touching the filesystem when there is nothing to write.
pub async fn write_output(
    out_dir: &Path,
    job_id: &str,
    records: &[String],
) -> Result<Option<PathBuf>> {
    if records.is_empty() {
        return Ok(None);
    }

    let dir = out_dir.join(job_id);
    tokio::fs::create_dir_all(&dir).await?;

    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();
    let path = dir.join(format!("{}_{:x}.json", job_id, nanos));

    let mut contents = records.join("\n");
    contents.push('\n');
    tokio::fs::write(&path, contents).await?;

    tracing::info!(path = %path.display(), records = records.len(), "Wrote results");
    Ok(Some(path))
}
