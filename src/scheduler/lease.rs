use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{LeaseError, Result};
use crate::scheduler::catalog::{TokenCatalog, TokenSource};
use crate::scheduler::job::{Batch, JobRecord, JobSummary, LeaseRange};
use crate::scheduler::registry::JobRegistry;

/// Length of a generated lease key.
pub const LEASE_KEY_LEN: usize = 8;

const LEASE_KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Attempts at drawing a key that no outstanding lease of the job already uses.
const MAX_KEY_ATTEMPTS: usize = 8;

/// Catalog and registry, always mutated together under one lock.
#[derive(Debug, Default)]
struct LeaseState {
    catalog: TokenCatalog,
    registry: JobRegistry,
}

impl LeaseState {
    fn assign(
        &mut self,
        job_id: &str,
        batch_size: usize,
        lease_timeout: Duration,
        now: Instant,
    ) -> Result<Batch> {
        let catalog_len = self.catalog.len();
        let record = self.registry.get_or_create(job_id);
        let cursor = record.cursor();
        let count = batch_size.min(catalog_len.saturating_sub(cursor));

        if count > 0 {
            let tokens = self
                .catalog
                .slice(cursor..cursor + count)
                .map(<[String]>::to_vec)
                .ok_or_else(|| LeaseError::Internal(format!("cursor {cursor} out of bounds")))?;
            let key = mint_lease_key(|candidate| record.has_lease(candidate))
                .ok_or_else(|| LeaseError::KeyCollision(job_id.to_string()))?;

            record.carve(key.clone(), count, now);
            tracing::info!(job_id, lease_key = %key, count, cursor = record.cursor(), "Tokens assigned");
            return Ok(Batch::new(tokens, key));
        }

        match find_stale_lease(job_id, record, catalog_len, lease_timeout, now)? {
            Some((key, range)) => {
                record.touch(&key, now);
                let tokens = self
                    .catalog
                    .slice(range.as_range())
                    .map(<[String]>::to_vec)
                    .unwrap_or_default();
                tracing::info!(job_id, lease_key = %key, count = tokens.len(), "Tokens re-assigned");
                Ok(Batch::new(tokens, key))
            }
            None => {
                if record.outstanding_leases() == 0 {
                    tracing::info!(job_id, "Nothing pending");
                } else {
                    tracing::debug!(
                        job_id,
                        outstanding = record.outstanding_leases(),
                        "Catalog exhausted, no stale lease to re-assign"
                    );
                }
                Ok(Batch::empty())
            }
        }
    }

    fn release(&mut self, job_id: &str, lease_key: &str, now: Instant) -> bool {
        let Some(record) = self.registry.get_mut(job_id) else {
            tracing::info!(job_id, lease_key, "Done for unknown job");
            return false;
        };

        if !record.release(lease_key, now) {
            tracing::info!(job_id, lease_key, "Done for unknown lease key");
            return false;
        }

        tracing::info!(job_id, lease_key, "Lease released");
        if record.is_completed() {
            tracing::info!(
                job_id,
                duration_ms = record.total_duration.map(|d| d.as_millis() as u64),
                "Job completed"
            );
        }
        true
    }

    fn heartbeat(&mut self, job_id: &str, lease_key: &str, now: Instant) -> Result<bool> {
        let record = self
            .registry
            .get_mut(job_id)
            .ok_or_else(|| LeaseError::JobNotFound(job_id.to_string()))?;

        if record.touch(lease_key, now) {
            tracing::debug!(job_id, lease_key, "Heartbeat received");
        } else {
            tracing::debug!(job_id, lease_key, "Heartbeat for unknown lease key");
        }
        Ok(record.is_completed())
    }
}

/// First lease (in map order) whose heartbeat is older than `timeout`.
///
/// Every lease visited is bounds-checked against the catalog; a range past
/// the end is a bookkeeping fault.
fn find_stale_lease(
    job_id: &str,
    record: &JobRecord,
    catalog_len: usize,
    timeout: Duration,
    now: Instant,
) -> Result<Option<(String, LeaseRange)>> {
    for (key, range) in record.leases() {
        if range.end() > catalog_len {
            tracing::error!(job_id, lease_key = %key, start = range.start, count = range.count, catalog_len, "Bookkeeping fault");
            return Err(LeaseError::BookkeepingFault {
                job_id: job_id.to_string(),
                lease_key: key.clone(),
                start: range.start,
                end: range.end(),
                catalog_len,
            });
        }
        if record.is_stale(key, timeout, now) {
            return Ok(Some((key.clone(), *range)));
        }
    }
    Ok(None)
}

fn random_lease_key<R: Rng>(rng: &mut R) -> String {
    (0..LEASE_KEY_LEN)
        .map(|_| LEASE_KEY_ALPHABET[rng.gen_range(0..LEASE_KEY_ALPHABET.len())] as char)
        .collect()
}

/// Draw a random key not rejected by `taken`, giving up after a few collisions.
fn mint_lease_key(taken: impl Fn(&str) -> bool) -> Option<String> {
    let mut rng = rand::thread_rng();
    for _ in 0..MAX_KEY_ATTEMPTS {
        let key = random_lease_key(&mut rng);
        if !taken(&key) {
            return Some(key);
        }
        tracing::warn!(lease_key = %key, "Lease key collision, drawing again");
    }
    None
}

/// Hands out leases over the token catalog.
///
/// Every operation takes the same lock for its whole duration, so all state
/// transitions are serialized. Rescan reads the token source outside that
/// lock but holds `rescan_guard` from scan through swap, so overlapping
/// rescans install their listings in call order.
pub struct LeaseScheduler {
    state: Mutex<LeaseState>,
    rescan_guard: Mutex<()>,
    source: Arc<dyn TokenSource>,
    lease_timeout: Duration,
}

impl LeaseScheduler {
    /// Create a scheduler with an empty catalog. Call [`rescan`](Self::rescan)
    /// to populate it.
    pub fn new(source: Arc<dyn TokenSource>, lease_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(LeaseState::default()),
            rescan_guard: Mutex::new(()),
            source,
            lease_timeout,
        }
    }

    pub fn lease_timeout(&self) -> Duration {
        self.lease_timeout
    }

    /// Lease up to `batch_size` fresh tokens for `job_id`, or re-issue a
    /// stale lease once the catalog is exhausted for the job.
    pub async fn get(&self, job_id: &str, batch_size: usize) -> Result<Batch> {
        if batch_size == 0 {
            return Err(LeaseError::InvalidBatchSize(0));
        }
        let mut state = self.state.lock().await;
        state.assign(job_id, batch_size, self.lease_timeout, Instant::now())
    }

    /// Release a lease. Returns true only if the key was outstanding.
    pub async fn done(&self, job_id: &str, lease_key: &str) -> bool {
        let mut state = self.state.lock().await;
        state.release(job_id, lease_key, Instant::now())
    }

    /// Refresh a lease's heartbeat and report whether the job has drained.
    pub async fn heartbeat(&self, job_id: &str, lease_key: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.heartbeat(job_id, lease_key, Instant::now())
    }

    /// Drop all job records. Returns the catalog size.
    pub async fn reset(&self) -> usize {
        let mut state = self.state.lock().await;
        let dropped = state.registry.clear();
        tracing::info!(jobs_dropped = dropped, "Job history reset");
        state.catalog.len()
    }

    /// Rebuild the catalog from the token source and drop all job records.
    ///
    /// If the source fails, catalog and registry are left untouched.
    pub async fn rescan(&self) -> Result<usize> {
        let _rescan = self.rescan_guard.lock().await;
        let tokens = self.source.scan().await?;

        let mut state = self.state.lock().await;
        let count = state.catalog.replace(tokens);
        let dropped = state.registry.clear();
        tracing::info!(count, jobs_dropped = dropped, "Catalog rescanned");
        Ok(count)
    }

    /// Permute the catalog. Outstanding leases keep their index ranges.
    pub async fn shuffle(&self) -> usize {
        let mut state = self.state.lock().await;
        let count = state.catalog.shuffle();
        tracing::info!(count, "Catalog shuffled");
        count
    }

    pub async fn show(&self) -> Vec<String> {
        let state = self.state.lock().await;
        tracing::debug!(count = state.catalog.len(), "Listing tokens");
        state.catalog.snapshot()
    }

    pub async fn token_count(&self) -> usize {
        self.state.lock().await.catalog.len()
    }

    /// Evict job records older than `retention`. Returns how many went.
    pub async fn sweep(&self, retention: Duration) -> usize {
        let mut state = self.state.lock().await;
        let removed = state.registry.sweep(retention, Instant::now());
        tracing::info!(removed, remaining = state.registry.len(), "Job registry swept");
        removed
    }

    pub async fn job_summaries(&self) -> Vec<JobSummary> {
        self.state.lock().await.registry.summaries()
    }

    pub async fn job_summary(&self, job_id: &str) -> Option<JobSummary> {
        let state = self.state.lock().await;
        state
            .registry
            .get(job_id)
            .map(|record| JobSummary::from_record(job_id, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::catalog::StaticSource;

    async fn scheduler(tokens: &[&str]) -> LeaseScheduler {
        let source = Arc::new(StaticSource::new(tokens.iter().copied()));
        let scheduler = LeaseScheduler::new(source, Duration::from_secs(60));
        scheduler.rescan().await.unwrap();
        scheduler
    }

    #[test]
    fn lease_keys_use_letters_only() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let key = random_lease_key(&mut rng);
            assert_eq!(key.len(), LEASE_KEY_LEN);
            assert!(key.chars().all(|c| c.is_ascii_alphabetic()));
        }
    }

    #[test]
    fn mint_gives_up_when_every_key_is_taken() {
        assert!(mint_lease_key(|_| true).is_none());
        assert!(mint_lease_key(|_| false).is_some());
    }

    #[tokio::test]
    async fn out_of_bounds_lease_is_a_bookkeeping_fault() {
        let scheduler = scheduler(&["a", "b", "c"]).await;
        scheduler.get("job1", 3).await.unwrap();

        {
            let mut state = scheduler.state.lock().await;
            state
                .registry
                .get_or_create("job1")
                .insert_raw_lease("corrupt1", LeaseRange::new(2, 5));
        }

        let err = scheduler.get("job1", 1).await.unwrap_err();
        assert!(matches!(err, LeaseError::BookkeepingFault { .. }));

        // Other jobs keep being served
        let batch = scheduler.get("job2", 2).await.unwrap();
        assert_eq!(batch.tokens, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let scheduler = scheduler(&["a"]).await;
        let err = scheduler.get("job1", 0).await.unwrap_err();
        assert!(matches!(err, LeaseError::InvalidBatchSize(0)));
        assert!(scheduler.job_summary("job1").await.is_none());
    }
}
