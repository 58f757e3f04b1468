use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::scheduler::job::{JobRecord, JobSummary};

/// Owns every job record, keyed by job ID.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: HashMap<String, JobRecord>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the record for `job_id`, creating it on first use.
    pub fn get_or_create(&mut self, job_id: &str) -> &mut JobRecord {
        self.jobs.entry(job_id.to_string()).or_insert_with(|| {
            tracing::debug!(job_id, "Job record created");
            JobRecord::new()
        })
    }

    pub fn get(&self, job_id: &str) -> Option<&JobRecord> {
        self.jobs.get(job_id)
    }

    pub fn get_mut(&mut self, job_id: &str) -> Option<&mut JobRecord> {
        self.jobs.get_mut(job_id)
    }

    /// Drop every record. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.jobs.len();
        self.jobs.clear();
        removed
    }

    /// Remove records created longer than `retention` ago, completed or not.
    /// Returns the number of records removed.
    pub fn sweep(&mut self, retention: Duration, now: Instant) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, record| record.age(now) < retention);
        before - self.jobs.len()
    }

    /// Summaries of all jobs, oldest first.
    pub fn summaries(&self) -> Vec<JobSummary> {
        let mut summaries: Vec<JobSummary> = self
            .jobs
            .iter()
            .map(|(id, record)| JobSummary::from_record(id, record))
            .collect();
        summaries.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        summaries
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
