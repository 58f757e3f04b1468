use std::collections::HashMap;
use std::ops::Range;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// Token-index range handed out under one lease key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseRange {
    pub start: usize,
    pub count: usize,
}

impl LeaseRange {
    pub fn new(start: usize, count: usize) -> Self {
        Self { start, count }
    }

    pub fn end(&self) -> usize {
        self.start + self.count
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end()
    }
}

/// What a Get call hands back to a worker. An empty batch carries an empty
/// lease key and means there is nothing to do for the job right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub tokens: Vec<String>,
    pub lease_key: String,
}

impl Batch {
    pub fn new(tokens: Vec<String>, lease_key: String) -> Self {
        Self { tokens, lease_key }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }
}

/// Per-job bookkeeping: assignment cursor, outstanding leases and their
/// heartbeats, and lifecycle markers.
#[derive(Debug, Clone)]
pub struct JobRecord {
    cursor: usize,
    leases: HashMap<String, LeaseRange>,
    last_heartbeat: HashMap<String, Instant>,
    completed: bool,
    started: Instant,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_duration: Option<Duration>,
}

impl Default for JobRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRecord {
    pub fn new() -> Self {
        Self {
            cursor: 0,
            leases: HashMap::new(),
            last_heartbeat: HashMap::new(),
            completed: false,
            started: Instant::now(),
            started_at: Utc::now(),
            completed_at: None,
            total_duration: None,
        }
    }

    /// Index of the next token that has never been leased for this job.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn outstanding_leases(&self) -> usize {
        self.leases.len()
    }

    pub fn has_lease(&self, key: &str) -> bool {
        self.leases.contains_key(key)
    }

    pub fn lease(&self, key: &str) -> Option<LeaseRange> {
        self.leases.get(key).copied()
    }

    pub fn leases(&self) -> impl Iterator<Item = (&String, &LeaseRange)> {
        self.leases.iter()
    }

    /// Time since the record was created.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    /// Carve `[cursor, cursor + count)` under `key` and advance the cursor.
    ///
    /// The new lease starts with a fresh heartbeat, and the job is no
    /// longer completed.
    pub fn carve(&mut self, key: String, count: usize, now: Instant) -> LeaseRange {
        let range = LeaseRange::new(self.cursor, count);
        self.cursor += count;
        self.last_heartbeat.insert(key.clone(), now);
        self.leases.insert(key, range);
        self.completed = false;
        range
    }

    /// Record a heartbeat for an outstanding lease. Returns false for a key
    /// this job does not hold.
    pub fn touch(&mut self, key: &str, now: Instant) -> bool {
        if !self.leases.contains_key(key) {
            return false;
        }
        self.last_heartbeat.insert(key.to_string(), now);
        true
    }

    /// Whether the lease has gone longer than `timeout` without a heartbeat.
    pub fn is_stale(&self, key: &str, timeout: Duration, now: Instant) -> bool {
        match self.last_heartbeat.get(key) {
            Some(last) => now.saturating_duration_since(*last) > timeout,
            None => true,
        }
    }

    /// Drop a lease. Returns false when the key is unknown.
    ///
    /// Releasing the last outstanding lease completes the job and records
    /// its end time and total duration.
    pub fn release(&mut self, key: &str, now: Instant) -> bool {
        if self.leases.remove(key).is_none() {
            return false;
        }
        self.last_heartbeat.remove(key);

        if self.leases.is_empty() {
            self.completed = true;
            self.completed_at = Some(Utc::now());
            self.total_duration = Some(self.age(now));
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn insert_raw_lease(&mut self, key: &str, range: LeaseRange) {
        self.leases.insert(key.to_string(), range);
    }
}

/// Read-only view of one job, used by the dashboard and tests.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub cursor: usize,
    pub outstanding_leases: usize,
    pub completed: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl JobSummary {
    pub fn from_record(job_id: &str, record: &JobRecord) -> Self {
        Self {
            job_id: job_id.to_string(),
            cursor: record.cursor(),
            outstanding_leases: record.outstanding_leases(),
            completed: record.is_completed(),
            started_at: record.started_at,
            completed_at: record.completed_at,
            duration_ms: record.total_duration.map(|d| d.as_millis() as u64),
        }
    }
}
